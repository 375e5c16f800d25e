//! Body encryption with a single fixed scheme: RSA-OAEP, SHA-256 for both the
//! label hash and MGF1. Ciphertext travels as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use tracing::debug;

use crate::keys::{parse_public_key, IdentityKeypair};
use crate::{CryptoError, CryptoResult};

/// Bodies shorter than this are always treated as plaintext
///
/// A 2048-bit ciphertext encodes to 344 base64 characters, so real
/// ciphertext is far above this bound.
pub const MIN_CIPHERTEXT_LEN: usize = 100;

const SHA256_LEN: usize = 32;

pub(crate) fn oaep_capacity(modulus_len: usize) -> usize {
    modulus_len.saturating_sub(2 * SHA256_LEN + 2)
}

/// Encrypt `plaintext` for the holder of `recipient_public_key`
///
/// With no published key the plaintext is returned unchanged; this is the
/// degraded mode for recipients that never uploaded a key, not an error.
/// Empty bodies are returned unchanged as well so media-only messages stay
/// media-only.
pub fn encrypt_for(recipient_public_key: Option<&str>, plaintext: &str) -> CryptoResult<String> {
    let Some(public_b64) = recipient_public_key.filter(|k| !k.trim().is_empty()) else {
        return Ok(plaintext.to_string());
    };
    if plaintext.is_empty() {
        return Ok(String::new());
    }

    let public = parse_public_key(public_b64)?;
    let max = oaep_capacity(public.size());
    if plaintext.len() > max {
        return Err(CryptoError::PlaintextTooLong {
            len: plaintext.len(),
            max,
        });
    }

    let mut rng = rand::thread_rng();
    let ciphertext = public
        .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(STANDARD.encode(ciphertext))
}

/// Guess whether a stored or received body is ciphertext
///
/// Only the base64 alphabet and a minimum length are checked. A long
/// plaintext made solely of base64 characters is misclassified; decryption
/// then fails and the caller still gets the original text back.
pub fn looks_like_ciphertext(body: &str) -> bool {
    body.len() >= MIN_CIPHERTEXT_LEN
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
}

/// Decrypt a body addressed to `keypair`, never failing
pub fn decrypt_own(keypair: &IdentityKeypair, body: &str) -> String {
    keypair.decrypt_own(body)
}

pub(crate) fn decrypt_with(private: &RsaPrivateKey, body: &str) -> String {
    if !looks_like_ciphertext(body) {
        return body.to_string();
    }

    match try_decrypt(private, body) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            debug!(error = %e, len = body.len(), "body classified as ciphertext but did not decrypt; showing raw");
            body.to_string()
        }
    }
}

fn try_decrypt(private: &RsaPrivateKey, body: &str) -> CryptoResult<String> {
    let bytes = STANDARD
        .decode(body)
        .map_err(|e| CryptoError::Decryption(format!("base64: {e}")))?;
    let plaintext = private
        .decrypt(Oaep::new::<Sha256>(), &bytes)
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::Decryption(format!("utf-8: {e}")))
}
