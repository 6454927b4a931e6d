// ABOUTME: RSA signing key and JWKS (JSON Web Key Set) support for ID tokens
// ABOUTME: One RS256 keypair per server instance, public half served as a JWK set
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::{
    pkcs8::{EncodePrivateKey, EncodePublicKey},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};

/// RSA key size in bits. 2048 keeps server startup fast enough for
/// per-test instances while satisfying RS256.
const RSA_KEY_SIZE: usize = 2048;

/// JWK (JSON Web Key) representation for the JWKS endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// The instance signing keypair.
///
/// Generated once at server construction, shared read-only afterwards,
/// rotated never. The private key stays in process memory; the public key
/// is distributed via `/jwks`.
pub struct SigningKey {
    kid: String,
    public_key: RsaPublicKey,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Generate a fresh RSA keypair for RS256 signing.
    ///
    /// # Errors
    /// Returns an error if key generation or PEM encoding fails.
    pub fn generate() -> Result<Self> {
        use rand::rngs::OsRng;

        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_SIZE)
            .map_err(|e| anyhow!("Failed to generate RSA private key: {e}"))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| anyhow!("Failed to export private key as PEM: {e}"))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| anyhow!("Failed to build RS256 encoding key: {e}"))?;

        let public_pem = public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| anyhow!("Failed to export public key as PEM: {e}"))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| anyhow!("Failed to build RS256 decoding key: {e}"))?;

        Ok(Self {
            kid: format!("key_{}", Utc::now().format("%Y%m%d_%H%M%S")),
            public_key,
            encoding_key,
            decoding_key,
        })
    }

    /// Key ID placed in the `kid` header of signed ID tokens.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Key for JWT signing.
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Key for JWT verification; handy for embedding test suites that want
    /// to verify ID token signatures.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public key in JWK format.
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        let n = self.public_key.n().to_bytes_be();
        let e = self.public_key.e().to_bytes_be();

        JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(),
            alg: "RS256".to_owned(),
            n: URL_SAFE_NO_PAD.encode(n),
            e: URL_SAFE_NO_PAD.encode(e),
        }
    }

    /// JWKS document for public key distribution.
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: vec![self.to_jwk()],
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}
