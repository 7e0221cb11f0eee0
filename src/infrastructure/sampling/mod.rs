pub mod system_sampler;

pub use system_sampler::SystemSampler;
