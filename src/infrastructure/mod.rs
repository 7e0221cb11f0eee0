pub mod core;
pub mod observability;
pub mod persistence;
pub mod sampling;
pub mod security;
pub mod transport;
