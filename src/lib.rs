pub mod config;
pub mod errors;
pub mod gatekeeper;
pub mod metrics;
pub mod metrics_server;
pub mod processor;
pub mod redis;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::{AppConfig, PolicyCache};
pub use errors::{GatewayError, Result};
pub use gatekeeper::{Decision, Gatekeeper, ScriptedGatekeeper};
pub use processor::{SimulatedProcessor, TransactionProcessor};
pub use server::handler::{TransactionOutcome, TransactionService};
pub use server::{build_router, start_server, ServerConfig};
pub use store::{MemoryStore, StateStore};
