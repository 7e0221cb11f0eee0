pub mod orchestrator;
pub mod persistence_hub;

pub use orchestrator::SyncOrchestrator;
pub use persistence_hub::PersistenceHub;
