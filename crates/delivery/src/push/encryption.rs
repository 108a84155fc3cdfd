//! `aes128gcm` content encoding for Web Push payloads (RFC 8188 / RFC 8291).
//!
//! Each message uses a fresh application-server ECDH key and a random salt.
//! The payload is sent as a single record:
//!
//! ```text
//! salt (16) | rs (u32 BE) | idlen (1) | keyid = as_public (65) | ciphertext
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::Rng;
use sha2::Sha256;

use super::{decode_base64url, PushError};

/// Record size advertised in the header.
pub const RECORD_SIZE: u32 = 4096;

/// AEAD tag length appended to the ciphertext.
const TAG_LEN: usize = 16;

/// Largest plaintext that fits in one record (tag and padding delimiter
/// excluded).
pub const MAX_PAYLOAD_LEN: usize = RECORD_SIZE as usize - TAG_LEN - 1;

const KEY_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// Padding delimiter for the final (and only) record.
const LAST_RECORD_DELIMITER: u8 = 0x02;

/// Encrypt `payload` for a subscription whose keys are base64url encoded.
pub fn encrypt(p256dh: &str, auth: &str, payload: &[u8]) -> Result<Vec<u8>, PushError> {
    let ua_public = decode_base64url(p256dh)
        .map_err(|_| PushError::InvalidSubscription("p256dh is not base64url".into()))?;
    let auth = decode_base64url(auth)
        .map_err(|_| PushError::InvalidSubscription("auth is not base64url".into()))?;
    if auth.len() != 16 {
        return Err(PushError::InvalidSubscription(format!(
            "auth secret must be 16 bytes, got {}",
            auth.len()
        )));
    }
    let mut salt = [0u8; 16];
    rand::rng().fill(&mut salt);
    encrypt_with(&ua_public, &auth, payload, &random_secret_key(), salt)
}

/// Encrypt with an explicit application-server key and salt.
pub fn encrypt_with(
    ua_public: &[u8],
    auth: &[u8],
    payload: &[u8],
    as_secret: &SecretKey,
    salt: [u8; 16],
) -> Result<Vec<u8>, PushError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(PushError::Encryption(format!(
            "payload of {} bytes exceeds {MAX_PAYLOAD_LEN}",
            payload.len()
        )));
    }
    let ua_key = PublicKey::from_sec1_bytes(ua_public)
        .map_err(|_| PushError::InvalidSubscription("p256dh is not a P-256 point".into()))?;
    let ua_point = ua_key.to_encoded_point(false);
    let as_point = as_secret.public_key().to_encoded_point(false);

    let shared = p256::ecdh::diffie_hellman(as_secret.to_nonzero_scalar(), ua_key.as_affine());

    let (cek, nonce) = derive_key_and_nonce(
        shared.raw_secret_bytes(),
        auth,
        ua_point.as_bytes(),
        as_point.as_bytes(),
        &salt,
    )?;

    let mut plaintext = Vec::with_capacity(payload.len() + 1);
    plaintext.extend_from_slice(payload);
    plaintext.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&cek)
        .map_err(|e| PushError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|e| PushError::Encryption(e.to_string()))?;

    let key_id = as_point.as_bytes();
    let mut body = Vec::with_capacity(16 + 4 + 1 + key_id.len() + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(key_id.len() as u8);
    body.extend_from_slice(key_id);
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// Content-encryption key and nonce for one message.
pub(crate) fn derive_key_and_nonce(
    ecdh_secret: &[u8],
    auth: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<([u8; 16], [u8; 12]), PushError> {
    let mut key_info = Vec::with_capacity(KEY_INFO_PREFIX.len() + 130);
    key_info.extend_from_slice(KEY_INFO_PREFIX);
    key_info.extend_from_slice(ua_public);
    key_info.extend_from_slice(as_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth), ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|e| PushError::Encryption(e.to_string()))?;

    let hk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut cek = [0u8; 16];
    let mut nonce = [0u8; 12];
    hk.expand(CEK_INFO, &mut cek)
        .map_err(|e| PushError::Encryption(e.to_string()))?;
    hk.expand(NONCE_INFO, &mut nonce)
        .map_err(|e| PushError::Encryption(e.to_string()))?;
    Ok((cek, nonce))
}

/// A uniformly random P-256 secret key.
pub(crate) fn random_secret_key() -> SecretKey {
    let mut rng = rand::rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        // Rejects zero and values above the group order; both are negligible.
        if let Ok(key) = SecretKey::from_slice(&bytes) {
            return key;
        }
    }
}
