//! Chunked RSA-OAEP(SHA-256) over compressed payloads.
//!
//! A message longer than one OAEP block is split into plaintext chunks of
//! `k - 2*hLen - 2` bytes, where `k` is the modulus size. Each chunk encrypts
//! to exactly `k` bytes and the blocks are concatenated.
//!
//! The agent's public key may be PEM or a single OpenSSH `authorized_keys`
//! entry (`ssh-rsa AAAA... comment`). The collector's private key is PEM.

use crate::domain::errors::CodecError;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::path::Path;

const SSH_RSA: &str = "ssh-rsa";

fn read_key(path: &Path) -> Result<String, CodecError> {
    std::fs::read_to_string(path).map_err(|e| CodecError::Key {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Length-prefixed fields of the SSH public key wire format
struct SshFields<'a>(&'a [u8]);

impl<'a> SshFields<'a> {
    fn next(&mut self) -> Result<&'a [u8], String> {
        let (len, rest) = self.0.split_first_chunk::<4>().ok_or("truncated ssh key")?;
        let len = u32::from_be_bytes(*len) as usize;
        if rest.len() < len {
            return Err("truncated ssh key".into());
        }
        let (field, rest) = rest.split_at(len);
        self.0 = rest;
        Ok(field)
    }
}

fn parse_authorized_key(text: &str) -> Result<RsaPublicKey, String> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or("empty key file")?;
    // Leading options such as `from="..."` are skipped
    let mut fields = line.split_whitespace().skip_while(|f| *f != SSH_RSA);
    if fields.next().is_none() {
        return Err(format!("expected an {} key", SSH_RSA));
    }
    let encoded = fields.next().ok_or("missing key data")?;
    let blob = BASE64
        .decode(encoded)
        .map_err(|e| format!("invalid key data: {}", e))?;

    let mut wire = SshFields(&blob);
    if wire.next()? != SSH_RSA.as_bytes() {
        return Err("key data does not describe an ssh-rsa key".into());
    }
    let e = BigUint::from_bytes_be(wire.next()?);
    let n = BigUint::from_bytes_be(wire.next()?);
    RsaPublicKey::new(n, e).map_err(|e| e.to_string())
}

/// Agent side: holds the collector's public key
#[derive(Debug, Clone)]
pub struct PayloadEncryptor {
    key: RsaPublicKey,
}

impl PayloadEncryptor {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Accepts SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, String> {
        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map(Self::new)
            .map_err(|e| e.to_string())
    }

    pub fn from_authorized_key(line: &str) -> Result<Self, String> {
        parse_authorized_key(line).map(Self::new)
    }

    /// Load a PEM or `authorized_keys` public key file.
    pub fn from_key_file(path: &Path) -> Result<Self, CodecError> {
        let text = read_key(path)?;
        let parsed = if text.trim_start().starts_with("-----BEGIN") {
            Self::from_pem(&text)
        } else {
            Self::from_authorized_key(&text)
        };
        parsed.map_err(|reason| CodecError::Key {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Largest plaintext chunk one OAEP block can carry.
    pub fn chunk_size(&self) -> usize {
        self.key.size() - 2 * Sha256::output_size() - 2
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut rng = OsRng;
        let mut out = Vec::with_capacity(plaintext.len().div_ceil(self.chunk_size()) * self.key.size());
        for chunk in plaintext.chunks(self.chunk_size()) {
            let block = self
                .key
                .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
                .map_err(|e| CodecError::Encryption(e.to_string()))?;
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}

/// Collector side: holds the private key
#[derive(Debug, Clone)]
pub struct PayloadDecryptor {
    key: RsaPrivateKey,
}

impl PayloadDecryptor {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Accepts PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, String> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map(Self::new)
            .map_err(|e| e.to_string())
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, CodecError> {
        Self::from_pem(&read_key(path)?).map_err(|reason| CodecError::Key {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Ciphertext block length, the modulus size in bytes.
    pub fn block_size(&self) -> usize {
        self.key.size()
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let block = self.block_size();
        if ciphertext.is_empty() || ciphertext.len() % block != 0 {
            return Err(CodecError::Decryption(format!(
                "ciphertext length {} is not a multiple of {}",
                ciphertext.len(),
                block
            )));
        }
        let mut out = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.chunks(block) {
            let plain = self
                .key
                .decrypt(Oaep::new::<Sha256>(), chunk)
                .map_err(|e| CodecError::Decryption(e.to_string()))?;
            out.extend_from_slice(&plain);
        }
        Ok(out)
    }
}
