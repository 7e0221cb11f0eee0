pub mod agent;
pub mod bootstrap;
pub mod ingest;
pub mod sync;

// Process assembly
pub mod system;
