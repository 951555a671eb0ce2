//! Digests, signature verification and the witness key provider
//!
//! Digests are Blake3-256 rendered as `E` + base64url (44 chars). Public keys
//! are base64url SEC1 compressed P-256 points and signatures are base64url
//! fixed-width `r || s`.

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::EncodedPoint;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::WitnessError;
use crate::types::{IndexedSignature, Threshold};

/// Derivation code prefixed to every digest.
pub const DIGEST_CODE: char = 'E';

/// Length of an encoded digest, also used for the placeholder.
pub const DIGEST_LENGTH: usize = 44;

/// Blake3-256 digest of `data`, encoded.
pub fn digest(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("{}{}", DIGEST_CODE, URL_SAFE_NO_PAD.encode(hash.as_bytes()))
}

/// Next-key commitment for a public key.
pub fn commit_key(public_key: &str) -> String {
    digest(public_key.as_bytes())
}

pub fn is_digest(value: &str) -> bool {
    value.len() == DIGEST_LENGTH
        && value.starts_with(DIGEST_CODE)
        && URL_SAFE_NO_PAD
            .decode(&value[1..])
            .map(|raw| raw.len() == 32)
            .unwrap_or(false)
}

// ==================== Verification ====================

/// Verifies one signature over `data` with one public key.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &str, data: &[u8], signature: &str) -> bool;
}

/// P-256 ECDSA verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct P256Verifier;

impl P256Verifier {
    fn parse_key(public_key: &str) -> Option<VerifyingKey> {
        let bytes = URL_SAFE_NO_PAD.decode(public_key).ok()?;
        let point = EncodedPoint::from_bytes(bytes).ok()?;
        VerifyingKey::from_encoded_point(&point).ok()
    }
}

impl SignatureVerifier for P256Verifier {
    fn verify(&self, public_key: &str, data: &[u8], signature: &str) -> bool {
        let Some(key) = Self::parse_key(public_key) else {
            return false;
        };
        let Ok(bytes) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        key.verify(data, &signature).is_ok()
    }
}

/// Checks indexed signatures against `keys` under `threshold`.
///
/// Out of range indices, repeated indices and signatures that fail to verify
/// are ignored; only the distinct valid indices count toward the threshold.
pub fn verify_threshold(
    verifier: &dyn SignatureVerifier,
    keys: &[String],
    threshold: &Threshold,
    data: &[u8],
    signatures: &[IndexedSignature],
) -> Result<(), WitnessError> {
    let mut valid = BTreeSet::new();
    for sig in signatures {
        let Some(key) = keys.get(sig.index as usize) else {
            continue;
        };
        if valid.contains(&sig.index) {
            continue;
        }
        if verifier.verify(key, data, &sig.signature) {
            valid.insert(sig.index);
        }
    }

    if threshold.is_satisfied(&valid) {
        Ok(())
    } else {
        Err(WitnessError::InvalidSignature(format!(
            "{} valid signature(s) do not satisfy threshold {}",
            valid.len(),
            threshold
        )))
    }
}

// ==================== Key Provider ====================

/// Custody of the witness's own signing key.
pub trait KeyProvider: Send + Sync {
    fn public_key(&self) -> String;
    fn sign(&self, data: &[u8]) -> Result<String, WitnessError>;
}

/// In-process P-256 key.
pub struct SoftwareKeyProvider {
    signing_key: SigningKey,
}

impl SoftwareKeyProvider {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_seed(seed: &[u8]) -> Result<Self, WitnessError> {
        let signing_key = SigningKey::from_slice(seed)
            .map_err(|e| WitnessError::Config(format!("Invalid signing seed: {}", e)))?;
        Ok(Self { signing_key })
    }

    /// Seed given as base64url (no padding).
    pub fn from_encoded_seed(seed: &str) -> Result<Self, WitnessError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(seed.trim())
            .map_err(|e| WitnessError::Config(format!("Seed is not base64url: {}", e)))?;
        Self::from_seed(&bytes)
    }
}

impl std::fmt::Debug for SoftwareKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareKeyProvider")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl KeyProvider for SoftwareKeyProvider {
    fn public_key(&self) -> String {
        let point = p256::PublicKey::from(self.signing_key.verifying_key()).to_encoded_point(true);
        URL_SAFE_NO_PAD.encode(point.as_bytes())
    }

    fn sign(&self, data: &[u8]) -> Result<String, WitnessError> {
        let signature: Signature = self
            .signing_key
            .try_sign(data)
            .map_err(|e| WitnessError::SigningFailed(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(signature.to_bytes()))
    }
}
