//! Signed cookie envelopes.
//!
//! The cookie only ever carries `{session id, creation stamp}`, signed as a
//! compact HS256 JWS. Several signing secrets can be active at once so
//! secrets can be rotated without logging everybody out: tokens are signed
//! with the first secret and accepted if any secret verifies them.

use std::sync::atomic::{AtomicI64, Ordering};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Upper bound for an encoded token, in bytes
pub const MAX_TOKEN_LENGTH: usize = 4096;

/// Data carried inside the session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: String,
    pub created: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CookieClaims {
    /// Cookie name the token was issued for
    name: String,
    sid: String,
    created: String,
    /// Issued at (Unix timestamp)
    iat: i64,
}

/// Error type for cookie encoding and decoding
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("No cookie codecs configured")]
    NoCodecs,

    /// Returned for every decode failure, whichever codec got furthest
    #[error("Invalid session cookie")]
    InvalidToken,

    #[error("Encoded cookie value is too long ({0} bytes)")]
    TooLong(usize),

    #[error("Cookie signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// One signing secret
pub struct CookieCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl CookieCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the shared max-age instead of a baked-in exp
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    fn sign(&self, claims: &CookieClaims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
    }

    fn verify(&self, token: &str) -> Option<CookieClaims> {
        decode::<CookieClaims>(token, &self.decoding_key, &self.validation)
            .ok()
            .map(|data| data.claims)
    }
}

impl std::fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CookieCodec { .. }")
    }
}

/// Ordered codecs sharing one max-age.
///
/// The max-age lives here, once, and every decode reads it a single time,
/// so a concurrent `set_max_age` is seen by a decode either entirely or not
/// at all.
#[derive(Debug)]
pub struct CodecSet {
    codecs: Vec<CookieCodec>,
    max_age: AtomicI64,
}

impl CodecSet {
    pub fn new(codecs: Vec<CookieCodec>, max_age: i64) -> Self {
        Self {
            codecs,
            max_age: AtomicI64::new(max_age),
        }
    }

    /// Build one codec per secret, newest secret first.
    pub fn from_secrets<S: AsRef<[u8]>>(secrets: &[S], max_age: i64) -> Self {
        Self::new(
            secrets
                .iter()
                .map(|secret| CookieCodec::new(secret.as_ref()))
                .collect(),
            max_age,
        )
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Token lifetime in seconds, 0 or less disables the age check
    pub fn max_age(&self) -> i64 {
        self.max_age.load(Ordering::Acquire)
    }

    pub fn set_max_age(&self, max_age: i64) {
        self.max_age.store(max_age, Ordering::Release);
    }

    /// Sign `envelope` for the cookie `name` with the first codec.
    pub fn encode(&self, name: &str, envelope: &Envelope) -> Result<String, CodecError> {
        self.encode_at(name, envelope, chrono::Utc::now().timestamp())
    }

    /// Verify a token for the cookie `name` against each codec in order.
    pub fn decode(&self, name: &str, token: &str) -> Result<Envelope, CodecError> {
        self.decode_at(name, token, chrono::Utc::now().timestamp())
    }

    pub(crate) fn encode_at(
        &self,
        name: &str,
        envelope: &Envelope,
        now: i64,
    ) -> Result<String, CodecError> {
        let codec = self.codecs.first().ok_or(CodecError::NoCodecs)?;

        let claims = CookieClaims {
            name: name.to_string(),
            sid: envelope.id.clone(),
            created: envelope.created.clone(),
            iat: now,
        };
        let token = codec.sign(&claims)?;

        if token.len() > MAX_TOKEN_LENGTH {
            return Err(CodecError::TooLong(token.len()));
        }
        Ok(token)
    }

    pub(crate) fn decode_at(&self, name: &str, token: &str, now: i64) -> Result<Envelope, CodecError> {
        if self.codecs.is_empty() {
            return Err(CodecError::NoCodecs);
        }
        if token.len() > MAX_TOKEN_LENGTH {
            return Err(CodecError::InvalidToken);
        }

        let max_age = self.max_age();
        let claims = self
            .codecs
            .iter()
            .find_map(|codec| codec.verify(token))
            .ok_or(CodecError::InvalidToken)?;

        if claims.name != name {
            return Err(CodecError::InvalidToken);
        }
        if max_age > 0 && now - claims.iat > max_age {
            return Err(CodecError::InvalidToken);
        }

        Ok(Envelope {
            id: claims.sid,
            created: claims.created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn envelope() -> Envelope {
        Envelope {
            id: "abc".to_string(),
            created: "20240102030405".to_string(),
        }
    }

    #[test]
    fn test_encode_decode() {
        let codecs = CodecSet::from_secrets(&["secret-1"], 3600);
        let token = codecs.encode("sid", &envelope()).unwrap();
        assert_eq!(codecs.decode("sid", &token).unwrap(), envelope());
    }

    #[test]
    fn test_rotation_accepts_older_secret() {
        let old = CodecSet::from_secrets(&["old"], 3600);
        let token = old.encode("sid", &envelope()).unwrap();

        let rotated = CodecSet::from_secrets(&["new", "old"], 3600);
        assert_eq!(rotated.decode("sid", &token).unwrap(), envelope());

        // New tokens are signed with the newest secret only
        let fresh = rotated.encode("sid", &envelope()).unwrap();
        assert!(matches!(
            old.decode("sid", &fresh),
            Err(CodecError::InvalidToken)
        ));
    }

    #[test]
    fn test_rotated_out_secret_rejected() {
        let token = CodecSet::from_secrets(&["retired"], 3600)
            .encode("sid", &envelope())
            .unwrap();
        let current = CodecSet::from_secrets(&["new", "old"], 3600);
        assert!(matches!(
            current.decode("sid", &token),
            Err(CodecError::InvalidToken)
        ));
    }

    #[test]
    fn test_tampered_and_foreign_tokens_rejected() {
        let codecs = CodecSet::from_secrets(&["secret"], 3600);
        let token = codecs.encode("sid", &envelope()).unwrap();

        // Splice another envelope's claims under this token's signature
        let other = codecs
            .encode(
                "sid",
                &Envelope {
                    id: "mallory".to_string(),
                    created: "20240102030405".to_string(),
                },
            )
            .unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);
        assert!(matches!(
            codecs.decode("sid", &tampered),
            Err(CodecError::InvalidToken)
        ));
        assert!(codecs.decode("sid", "garbage").is_err());

        // Bound to the cookie name
        assert!(matches!(
            codecs.decode("other", &token),
            Err(CodecError::InvalidToken)
        ));
    }

    #[test]
    fn test_max_age_enforced() {
        let codecs = CodecSet::from_secrets(&["secret"], 60);
        let token = codecs.encode_at("sid", &envelope(), NOW).unwrap();

        assert!(codecs.decode_at("sid", &token, NOW + 60).is_ok());
        assert!(codecs.decode_at("sid", &token, NOW + 61).is_err());

        // Zero disables the check
        codecs.set_max_age(0);
        assert!(codecs.decode_at("sid", &token, NOW + 10_000).is_ok());
    }

    #[test]
    fn test_max_age_change_applies_to_every_codec() {
        let codecs = CodecSet::from_secrets(&["a", "b"], 3600);
        let by_second = CodecSet::from_secrets(&["b"], 3600)
            .encode_at("sid", &envelope(), NOW)
            .unwrap();

        codecs.set_max_age(10);
        assert_eq!(codecs.max_age(), 10);
        assert!(codecs.decode_at("sid", &by_second, NOW + 5).is_ok());
        assert!(codecs.decode_at("sid", &by_second, NOW + 11).is_err());
    }

    #[test]
    fn test_no_codecs() {
        let codecs = CodecSet::from_secrets::<&str>(&[], 3600);
        assert!(codecs.is_empty());
        assert!(matches!(
            codecs.encode("sid", &envelope()),
            Err(CodecError::NoCodecs)
        ));
        assert!(matches!(
            codecs.decode("sid", "x"),
            Err(CodecError::NoCodecs)
        ));
    }

    #[test]
    fn test_oversized_envelope_refused() {
        let codecs = CodecSet::from_secrets(&["secret"], 3600);
        let huge = Envelope {
            id: "x".repeat(MAX_TOKEN_LENGTH),
            created: String::new(),
        };
        assert!(matches!(
            codecs.encode("sid", &huge),
            Err(CodecError::TooLong(_))
        ));
    }
}
