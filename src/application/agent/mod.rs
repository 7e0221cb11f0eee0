pub mod sampler;
pub mod sender;

pub use sampler::Sampler;
pub use sender::{ReportError, ReportOutcome, Sender};
