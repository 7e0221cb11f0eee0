use crate::domain::errors::CodecError;
use crate::domain::metric::{WireMetric, WirePayload};
use crate::infrastructure::security::{PayloadDecryptor, PayloadEncryptor};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// Gzip at the fastest level.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::fast());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Upper bound on an inflated request body.
pub const MAX_DECOMPRESSED_LEN: usize = 32 * 1024 * 1024;

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    decompress_limited(bytes, MAX_DECOMPRESSED_LEN)
}

/// Inflate at most `limit` bytes; anything longer is rejected.
pub fn decompress_limited(bytes: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(bytes).take(limit as u64 + 1);
    let mut out = Vec::with_capacity((bytes.len() * 4).min(limit));
    decoder.read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(out)
}

/// Wire codec: JSON, then gzip, then optional chunked RSA-OAEP.
///
/// The agent configures an encryptor, the collector a decryptor. Either side
/// may leave its key unset, in which case that layer is skipped.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    encryptor: Option<PayloadEncryptor>,
    decryptor: Option<PayloadDecryptor>,
}

impl Codec {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn with_encryptor(mut self, encryptor: PayloadEncryptor) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn with_decryptor(mut self, decryptor: PayloadDecryptor) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    /// Encode a batch into a request body. The body is always gzipped.
    pub fn encode_batch(&self, batch: &[WireMetric]) -> Result<Vec<u8>, CodecError> {
        let json = serde_json::to_vec(batch)?;
        let compressed = compress(&json)?;
        match &self.encryptor {
            Some(encryptor) => encryptor.encrypt(&compressed),
            None => Ok(compressed),
        }
    }

    /// Undo encryption (when a private key is loaded) and compression (when
    /// the request declared `Content-Encoding: gzip`).
    pub fn decode_body(&self, body: &[u8], gzipped: bool) -> Result<Vec<u8>, CodecError> {
        let plain = match &self.decryptor {
            Some(decryptor) => decryptor.decrypt(body)?,
            None => body.to_vec(),
        };
        if gzipped { decompress(&plain) } else { Ok(plain) }
    }

    /// Decode a single metric or a batch.
    pub fn decode_batch(&self, body: &[u8], gzipped: bool) -> Result<Vec<WireMetric>, CodecError> {
        let json = self.decode_body(body, gzipped)?;
        let payload: WirePayload = serde_json::from_slice(&json)?;
        Ok(payload.into_batch())
    }
}
