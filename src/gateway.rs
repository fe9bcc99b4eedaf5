//! Route registration for the public API and the internal seed listener.

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::fixture::Dataset;
use crate::handlers;
use crate::invoke::{LocalSeedInvoker, SeedInvoker};
use crate::provision::ProvisioningTrigger;
use crate::store::RecordStore;

/// Shared state of the public routes. Handlers keep nothing else between
/// requests.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
}

#[derive(Clone)]
pub struct InternalState {
    pub seeder: Arc<dyn SeedInvoker>,
    pub trigger: Option<Arc<ProvisioningTrigger>>,
}

impl InternalState {
    pub fn local(store: Arc<dyn RecordStore>, dataset: Arc<Dataset>) -> Self {
        Self {
            seeder: Arc::new(LocalSeedInvoker::new(store, dataset)),
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<ProvisioningTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }
}

/// Preflight for every origin and method; only the two headers clients send.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

pub fn public_router(store: Arc<dyn RecordStore>) -> Router {
    Router::new()
        .route("/products", get(handlers::list_products).fallback(handlers::method_not_allowed))
        .route(
            "/products/",
            get(handlers::get_product_without_id).fallback(handlers::method_not_allowed),
        )
        .route("/products/{id}", get(handlers::get_product).fallback(handlers::method_not_allowed))
        .fallback(handlers::unknown_route)
        .layer(cors_layer())
        .with_state(AppState { store })
}

/// Never mount this on the public listener.
pub fn internal_router(state: InternalState) -> Router {
    let mut router = Router::new().route("/seed", post(handlers::run_seed));
    if state.trigger.is_some() {
        router = router.route("/provision", post(handlers::provision));
    }
    router.with_state(state)
}

pub async fn serve(listener: TcpListener, router: Router, name: &str) -> std::io::Result<()> {
    info!("{} listening on {}", name, listener.local_addr()?);
    axum::serve(listener, router).await
}
