pub mod config;
pub mod error;
pub mod fixture;
pub mod gateway;
pub mod handlers;
pub mod invoke;
pub mod lifecycle;
pub mod product;
pub mod provision;
pub mod seed;
pub mod store;

pub use config::{Config, SeedTarget};
pub use error::ApiError;
pub use fixture::Dataset;
pub use gateway::{internal_router, public_router, InternalState};
pub use invoke::{LocalSeedInvoker, RemoteSeedInvoker, SeedInvoker};
pub use lifecycle::{SetupLifecycle, SetupState};
pub use product::{Product, SeedProduct};
pub use provision::{ProvisioningEvent, ProvisioningResponse, ProvisioningTrigger};
pub use seed::{seed, SeedError, SeedReport};
pub use store::{MemoryStore, RecordStore, SetupLedger, SledStore, StoreError};
