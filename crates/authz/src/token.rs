//! Stateless HS256 tokens.
//!
//! A token is `base64url(header).base64url(claims).base64url(signature)`.
//! Only `HS256` is accepted; the algorithm named in a presented header is
//! checked against it, never used to pick the verifier.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::role::Role;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature or algorithm does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token could not be signed: {0}")]
    Signing(String),
}

/// Source of the current time, injectable so expiry is testable.
pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: u64,
}

pub struct TokenService {
    secret: Vec<u8>,
    ttl_seconds: u64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build a signer over `secret`. An empty secret is refused; the caller
    /// treats that as fatal at startup.
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::Signing("signing secret is empty".to_string()));
        }
        Ok(Self {
            secret: secret.to_vec(),
            ttl_seconds: ttl.as_secs(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn issue(&self, subject: &str, role: Role) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now_epoch_seconds();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
        };
        let token = self.sign(&claims)?;

        tracing::debug!(subject, %role, expires_at = claims.exp, "token issued");
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    pub fn verify(&self, raw: &str) -> Result<Claims, TokenError> {
        let mut segments = raw.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::BadSignature);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_segment(claims_b64)?;
        if self.clock.now_epoch_seconds() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        };
        let header_b64 = encode_segment(&header)?;
        let claims_b64 = encode_segment(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let signature = self
            .mac()?
            .chain_update(signing_input.as_bytes())
            .finalize()
            .into_bytes();

        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|err| TokenError::Signing(err.to_string()))
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|err| TokenError::Signing(err.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret";

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_epoch_seconds(&self) -> u64 {
            self.0
        }
    }

    fn service_at(now: u64) -> TokenService {
        TokenService::new(SECRET, Duration::from_secs(3600))
            .unwrap()
            .with_clock(Arc::new(FixedClock(now)))
    }

    // Hand-assembled token so tests can forge headers and claims.
    fn forge(header: serde_json::Value, claims: serde_json::Value, key: &[u8]) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());
        let input = format!("{header_b64}.{claims_b64}");
        let signature = HmacSha256::new_from_slice(key)
            .unwrap()
            .chain_update(input.as_bytes())
            .finalize()
            .into_bytes();
        format!("{input}.{}", URL_SAFE_NO_PAD.encode(signature))
    }

    #[test]
    fn when_token_is_issued_then_it_verifies_to_same_subject_and_role() {
        let service = service_at(1_700_000_000);

        for (subject, role) in [("admin", Role::Admin), ("user1", Role::User)] {
            let issued = service.issue(subject, role).unwrap();
            assert_eq!(issued.expires_at, 1_700_003_600);

            let claims = service.verify(&issued.token).unwrap();
            assert_eq!(claims.sub, subject);
            assert_eq!(claims.role, role);
            assert_eq!(claims.iat, 1_700_000_000);
            assert_eq!(claims.exp, 1_700_003_600);
        }
    }

    #[test]
    fn when_token_was_issued_in_the_past_then_verify_reports_expired() {
        let issued = service_at(1_000).issue("user1", Role::User).unwrap();

        let later = service_at(1_000 + 3600);
        assert_eq!(later.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn when_clock_is_one_second_before_expiry_then_token_is_valid() {
        let issued = service_at(1_000).issue("user1", Role::User).unwrap();
        assert!(service_at(1_000 + 3599).verify(&issued.token).is_ok());
    }

    #[test]
    fn when_token_is_garbage_then_verify_reports_malformed() {
        let service = service_at(1_000);
        assert_eq!(service.verify(""), Err(TokenError::Malformed));
        assert_eq!(service.verify("token_invalido"), Err(TokenError::Malformed));
        assert_eq!(service.verify("a.b"), Err(TokenError::Malformed));
        assert_eq!(service.verify("a.b.c.d"), Err(TokenError::Malformed));
        assert_eq!(service.verify("%%%.%%%.%%%"), Err(TokenError::Malformed));
    }

    #[test]
    fn when_signed_with_another_key_then_verify_reports_bad_signature() {
        let issued = TokenService::new("other-secret", Duration::from_secs(3600))
            .unwrap()
            .with_clock(Arc::new(FixedClock(1_000)))
            .issue("admin", Role::Admin)
            .unwrap();

        assert_eq!(
            service_at(1_000).verify(&issued.token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn when_claims_are_tampered_then_verify_reports_bad_signature() {
        let service = service_at(1_000);
        let issued = service.issue("user1", Role::User).unwrap();
        let mut segments: Vec<&str> = issued.token.split('.').collect();

        let escalated = URL_SAFE_NO_PAD.encode(
            json!({"sub": "user1", "role": "admin", "iat": 1_000, "exp": 4_600}).to_string(),
        );
        segments[1] = &escalated;

        assert_eq!(
            service.verify(&segments.join(".")),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn when_header_names_another_algorithm_then_verify_reports_bad_signature() {
        let claims = json!({"sub": "admin", "role": "admin", "iat": 1_000, "exp": 9_000});

        for alg in ["none", "HS512", "RS256", "hs256"] {
            let token = forge(json!({"alg": alg, "typ": "JWT"}), claims.clone(), SECRET.as_bytes());
            assert_eq!(
                service_at(1_000).verify(&token),
                Err(TokenError::BadSignature),
                "alg {alg} must be rejected"
            );
        }
    }

    #[test]
    fn when_alg_is_none_and_signature_is_empty_then_verify_rejects() {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none"}).to_string());
        let claims = URL_SAFE_NO_PAD
            .encode(json!({"sub": "admin", "role": "admin", "iat": 1_000, "exp": 9_000}).to_string());
        let token = format!("{header}.{claims}.");

        assert_eq!(service_at(1_000).verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn when_claims_have_unknown_fields_then_verify_reports_malformed() {
        let token = forge(
            json!({"alg": "HS256", "typ": "JWT"}),
            json!({"sub": "admin", "role": "admin", "iat": 1_000, "exp": 9_000, "scope": "all"}),
            SECRET.as_bytes(),
        );
        assert_eq!(service_at(1_000).verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn when_claims_miss_required_fields_then_verify_reports_malformed() {
        let token = forge(
            json!({"alg": "HS256"}),
            json!({"sub": "admin", "role": "admin"}),
            SECRET.as_bytes(),
        );
        assert_eq!(service_at(1_000).verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn when_role_is_unknown_then_verify_reports_malformed() {
        let token = forge(
            json!({"alg": "HS256"}),
            json!({"sub": "admin", "role": "root", "iat": 1_000, "exp": 9_000}),
            SECRET.as_bytes(),
        );
        assert_eq!(service_at(1_000).verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn when_secret_is_empty_then_construction_fails() {
        let result = TokenService::new("", Duration::from_secs(60));
        assert!(matches!(result, Err(TokenError::Signing(_))));
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", service_at(0));
        assert!(!rendered.contains(SECRET));
    }
}
