pub mod config;
pub mod node;
pub mod orchestrator;

pub use node::{spawn_registry_refresher, Node};
pub use orchestrator::{NetworkStream, OrchestratorConfig, StreamOrchestrator};
