use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::{envelope, CryptoError, CryptoResult};

/// Modulus size for identity keys
pub const RSA_KEY_BITS: usize = 2048;

/// Asymmetric identity keypair
///
/// `RsaPrivateKey` zeroizes its limbs on drop; the exported PKCS#8 form is
/// handed out wrapped in [`Zeroizing`].
#[derive(Clone)]
pub struct IdentityKeypair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    public_b64: String,
}

impl IdentityKeypair {
    /// Generate a fresh RSA-2048 keypair (public exponent 65537)
    pub fn generate() -> CryptoResult<Self> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Self::from_private(private)
    }

    /// Restore a keypair from base64 PKCS#8 DER
    pub fn from_private_base64(private_b64: &str) -> CryptoResult<Self> {
        let der = Zeroizing::new(
            STANDARD
                .decode(private_b64.trim())
                .map_err(|e| CryptoError::KeyEncoding(format!("private key base64: {e}")))?,
        );
        let private = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| CryptoError::KeyEncoding(format!("private key pkcs8: {e}")))?;
        Self::from_private(private)
    }

    fn from_private(private: RsaPrivateKey) -> CryptoResult<Self> {
        let public = RsaPublicKey::from(&private);
        let public_b64 = encode_public_key(&public)?;
        Ok(Self {
            private,
            public,
            public_b64,
        })
    }

    /// Base64 SPKI DER of the public half, as published to the server
    pub fn public_key_base64(&self) -> &str {
        &self.public_b64
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Base64 PKCS#8 DER of the private half, for the local key store only
    pub fn private_key_base64(&self) -> CryptoResult<Zeroizing<String>> {
        let doc = self
            .private
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyEncoding(format!("private key pkcs8: {e}")))?;
        Ok(Zeroizing::new(STANDARD.encode(doc.as_bytes())))
    }

    /// Decrypt a body addressed to this keypair, falling back to the input
    pub fn decrypt_own(&self, body: &str) -> String {
        envelope::decrypt_with(&self.private, body)
    }

    /// Largest plaintext that fits one OAEP block for this modulus
    pub fn max_plaintext_len(&self) -> usize {
        envelope::oaep_capacity(self.public.size())
    }
}

impl std::fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeypair")
            .field("public_key", &self.public_b64)
            .finish_non_exhaustive()
    }
}

fn encode_public_key(public: &RsaPublicKey) -> CryptoResult<String> {
    let doc = public
        .to_public_key_der()
        .map_err(|e| CryptoError::KeyEncoding(format!("public key spki: {e}")))?;
    Ok(STANDARD.encode(doc.as_bytes()))
}

/// Parse a published base64 SPKI DER public key
pub fn parse_public_key(public_b64: &str) -> CryptoResult<RsaPublicKey> {
    let der = STANDARD
        .decode(public_b64.trim())
        .map_err(|e| CryptoError::InvalidPublicKey(format!("base64: {e}")))?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("spki: {e}")))
}
