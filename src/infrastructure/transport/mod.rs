pub mod codec;
pub mod http_transport;

pub use codec::Codec;
pub use http_transport::{HttpTransport, REAL_IP_HEADER};
