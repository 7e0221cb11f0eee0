pub mod cipher;
pub mod signer;
pub mod subnet;

pub use cipher::{PayloadDecryptor, PayloadEncryptor};
pub use signer::{Authenticator, compute_mac, verify_mac};
pub use subnet::TrustedSubnet;
