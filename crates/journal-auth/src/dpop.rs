//! DPoP (RFC 9449) proofs signed with a per-process ES256 key.
//!
//! Every request to the authorization server carries a `DPoP` header: a JWT
//! whose header embeds the public key and whose claims bind it to one HTTP
//! method and URL. Tokens issued this way are only usable with the same key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Url;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::pkce::generate_state;

pub const DPOP_HEADER: &str = "DPoP";
pub const DPOP_NONCE_HEADER: &str = "DPoP-Nonce";

#[derive(Debug, Serialize, Deserialize)]
pub struct DpopClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

pub struct DpopKey {
    encoding_key: EncodingKey,
    jwk: Jwk,
}

impl DpopKey {
    /// Fresh P-256 key pair.
    pub fn generate() -> Result<Self, AuthError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|_| AuthError::DpopKey {
                reason: "P-256 key generation failed".into(),
            })?;
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
            .map_err(|e| AuthError::DpopKey {
                reason: e.to_string(),
            })?;

        // Uncompressed SEC1 point: 0x04 || x || y.
        let point = pair.public_key().as_ref();
        let (x, y) = point[1..].split_at(32);
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
        }))?;

        Ok(Self {
            encoding_key: EncodingKey::from_ec_der(pkcs8.as_ref()),
            jwk,
        })
    }

    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Proof for one request. `htu` is `url` without query or fragment.
    pub fn proof(&self, method: &str, url: &str, nonce: Option<&str>) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some("dpop+jwt".into());
        header.jwk = Some(self.jwk.clone());

        let claims = DpopClaims {
            jti: generate_state(),
            htm: method.to_ascii_uppercase(),
            htu: target_uri(url)?,
            iat: chrono::Utc::now().timestamp(),
            nonce: nonce.map(str::to_owned),
        };

        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            AuthError::DpopKey {
                reason: e.to_string(),
            }
        })
    }
}

fn target_uri(url: &str) -> Result<String, AuthError> {
    let mut url = Url::parse(url).map_err(|e| AuthError::Discovery(format!("{url}: {e}")))?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Nonces are issued per server; this is the key they are stored under.
pub fn nonce_origin(url: &str) -> Result<String, AuthError> {
    let parsed = Url::parse(url).map_err(|e| AuthError::Discovery(format!("{url}: {e}")))?;
    Ok(parsed.origin().ascii_serialization())
}

/// A 400 answering "retry with the nonce I just sent you".
pub fn is_use_dpop_nonce(body: &str) -> bool {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    serde_json::from_str::<ErrorBody>(body).is_ok_and(|b| b.error == "use_dpop_nonce")
}
