//! `product-specs` — product specification API.
//!
//! Usage:
//!   product-specs serve [--listen <addr>]
//!   product-specs seed
//!   product-specs provision --event <path|->
//!
//! Configuration comes from the environment; see `Config`.

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use product_specs::{
    gateway, invoke, Config, Dataset, InternalState, ProvisioningEvent, ProvisioningTrigger, RecordStore,
    SeedInvoker, SetupLifecycle, SledStore,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "product-specs", about = "Product specification API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the public API (and the internal seed listener when configured).
    Serve {
        /// Overrides LISTEN_ADDR.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Write the seed dataset into the table once and exit.
    Seed,
    /// Handle one orchestrator event and report it to its callback URL.
    Provision {
        /// Event JSON file, or `-` for stdin.
        #[arg(long)]
        event: String,
    },
}

struct Runtime {
    config: Config,
    store: Arc<SledStore>,
    dataset: Arc<Dataset>,
}

impl Runtime {
    fn open(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
        let store = SledStore::open(&config.data_dir, &config.table_name)
            .with_context(|| format!("failed to open table {}", config.table_name))?;
        info!(table = store.table_name(), data_dir = %config.data_dir.display(), "Record store opened");

        let dataset = match &config.fixture_path {
            Some(path) => Dataset::load(path)?,
            None => Dataset::builtin()?,
        };
        info!(version = %dataset.version, fingerprint = %dataset.fingerprint, "Seed dataset loaded");

        Ok(Self {
            config,
            store: Arc::new(store),
            dataset: Arc::new(dataset),
        })
    }

    fn records(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    fn trigger(&self) -> anyhow::Result<ProvisioningTrigger> {
        // The seed timeout bounds the invocation, so only the callback needs its own.
        let invoker = invoke::invoker_for(
            &self.config.seed_target,
            self.records(),
            self.dataset.clone(),
            reqwest::Client::new(),
        );
        let callback_client = reqwest::Client::builder()
            .timeout(self.config.callback_timeout)
            .build()
            .context("failed to build callback client")?;
        let lifecycle = SetupLifecycle::new(self.store.clone());
        let state = lifecycle.recover().context("failed to read setup state")?;
        info!(?state, "Setup state");
        Ok(ProvisioningTrigger::new(
            invoker,
            lifecycle,
            callback_client,
            self.config.seed_timeout,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let runtime = Runtime::open(Config::from_env()?)?;

    match cli.command {
        Command::Serve { listen } => serve(runtime, listen).await,
        Command::Seed => {
            let invoker = invoke::LocalSeedInvoker::new(runtime.records(), runtime.dataset.clone());
            let report = invoker.invoke().await?;
            runtime.store.flush()?;
            info!(count = report.count, version = %report.version, "{}", report.message);
            Ok(())
        }
        Command::Provision { event } => {
            let event = read_event(&event)?;
            let response = runtime.trigger()?.handle(&event).await?;
            runtime.store.flush()?;
            info!(status = ?response.status, reason = %response.reason, "Provisioning reported");
            Ok(())
        }
    }
}

async fn serve(runtime: Runtime, listen: Option<String>) -> anyhow::Result<()> {
    let listen = listen.unwrap_or_else(|| runtime.config.listen.clone());

    if let Some(addr) = runtime.config.seed_listen.clone() {
        let state = InternalState::local(runtime.records(), runtime.dataset.clone())
            .with_trigger(Arc::new(runtime.trigger()?));
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind internal listener {addr}"))?;
        tokio::spawn(async move {
            if let Err(e) = gateway::serve(listener, gateway::internal_router(state), "Internal seed listener").await {
                warn!(error = %e, "Internal seed listener stopped");
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    gateway::serve(listener, gateway::public_router(runtime.records()), "Product API").await?;
    Ok(())
}

fn read_event(source: &str) -> anyhow::Result<ProvisioningEvent> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read event {source}"))?
    };
    serde_json::from_str(&raw).context("failed to parse provisioning event")
}
