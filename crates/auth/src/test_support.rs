//! Deterministic Ed25519 keys for unit tests.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};
use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::keys::{KeyAlgorithm, SigningKeys};

pub(crate) fn ed25519_keys(seed: u8) -> SigningKeys {
    let signing = SigningKey::from_bytes(&[seed; 32]);
    let der = signing.to_pkcs8_der().unwrap();
    let encoding = EncodingKey::from_ed_der(der.as_bytes());
    let x = URL_SAFE_NO_PAD.encode(signing.verifying_key().to_bytes());
    let decoding = DecodingKey::from_ed_components(&x).unwrap();
    SigningKeys::new(KeyAlgorithm::EdDsa, Some(encoding), decoding)
}

pub(crate) fn ed25519_verifier(seed: u8) -> SigningKeys {
    let signing = SigningKey::from_bytes(&[seed; 32]);
    let x = URL_SAFE_NO_PAD.encode(signing.verifying_key().to_bytes());
    let decoding = DecodingKey::from_ed_components(&x).unwrap();
    SigningKeys::new(KeyAlgorithm::EdDsa, None, decoding)
}

/// (private PKCS#8 PEM, public SPKI PEM)
pub(crate) fn ed25519_pem(seed: u8) -> (String, String) {
    let signing = SigningKey::from_bytes(&[seed; 32]);
    let private = signing.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
    let public = signing
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap();
    (private, public)
}
