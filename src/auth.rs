//! JWT token service for worker and admin identities.
//!
//! Two separate HS256 signing keys are used:
//!
//! - **Worker tokens** are minted at registration, never expire, and carry
//!   only the worker id as subject. Revocation is not cryptographic: a token
//!   is valid only while its worker still has a registration record, so
//!   deleting the record is the revocation mechanism.
//! - **Admin tokens** are issued by the external identity provider with the
//!   shared admin key; this service only verifies the signature, checks
//!   expiry, and extracts the subject.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Token validation and issuance errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingAuthHeader,

    #[error("Authorization header must use the Bearer scheme")]
    InvalidAuthFormat,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("JWT processing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Claims carried by a worker token. No `exp`: workers are long-running and
/// token renewal is not modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerClaims {
    /// Worker id.
    pub sub: String,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Unique token id, kept for audit.
    pub jti: String,
}

/// Claims carried by an admin token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Admin username.
    pub sub: String,
    /// Expiry (unix seconds); always validated.
    pub exp: i64,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Unique token id.
    pub jti: String,
}

/// Signs and verifies bearer tokens for both caller populations.
#[derive(Clone)]
pub struct TokenService {
    worker_encoding: EncodingKey,
    worker_decoding: DecodingKey,
    admin_encoding: EncodingKey,
    admin_decoding: DecodingKey,
}

impl TokenService {
    pub fn new(worker_secret: &str, admin_secret: &str) -> Self {
        Self {
            worker_encoding: EncodingKey::from_secret(worker_secret.as_bytes()),
            worker_decoding: DecodingKey::from_secret(worker_secret.as_bytes()),
            admin_encoding: EncodingKey::from_secret(admin_secret.as_bytes()),
            admin_decoding: DecodingKey::from_secret(admin_secret.as_bytes()),
        }
    }

    /// Mints a long-lived credential for a freshly registered worker.
    ///
    /// Returned exactly once at registration; only its hash is persisted.
    pub fn issue_worker_token(&self, worker_id: Uuid) -> Result<String, AuthError> {
        let claims = WorkerClaims {
            sub: worker_id.to_string(),
            iat: Utc::now().timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.worker_encoding,
        )?)
    }

    /// Verifies a worker token and returns its subject worker id.
    ///
    /// Expiry is deliberately not checked; callers must still confirm the
    /// worker's registration record exists before trusting the identity.
    pub fn verify_worker_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<WorkerClaims>(token, &self.worker_decoding, &validation)?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AuthError::InvalidToken("subject is not a worker id".to_string()))
    }

    /// Issues a time-bound admin token. Used by operator tooling and tests;
    /// production tokens come from the identity provider with the same key.
    pub fn issue_admin_token(&self, username: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AdminClaims {
            sub: username.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.admin_encoding,
        )?)
    }

    /// Verifies an admin token (signature and expiry) and returns the
    /// subject username.
    pub fn verify_admin_token(&self, token: &str) -> Result<String, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<AdminClaims>(token, &self.admin_decoding, &validation)?;
        Ok(data.claims.sub)
    }
}

/// One-way hash of a credential, for storage alongside the worker record.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Extracts the token from a `Bearer <token>` authorization header value.
pub fn extract_bearer_token(auth_header: &str) -> Result<&str, AuthError> {
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthFormat)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthFormat);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("worker-secret", "admin-secret")
    }

    #[test]
    fn test_worker_token_roundtrip() {
        let svc = service();
        let worker_id = Uuid::new_v4();
        let token = svc.issue_worker_token(worker_id).expect("issue");
        let subject = svc.verify_worker_token(&token).expect("verify");
        assert_eq!(subject, worker_id);
    }

    #[test]
    fn test_worker_token_has_no_expiry() {
        // A token issued "in the past" must still verify.
        let svc = service();
        let worker_id = Uuid::new_v4();
        let claims = WorkerClaims {
            sub: worker_id.to_string(),
            iat: Utc::now().timestamp() - 365 * 24 * 3600,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"worker-secret"),
        )
        .expect("encode");

        assert_eq!(svc.verify_worker_token(&token).expect("verify"), worker_id);
    }

    #[test]
    fn test_worker_token_rejects_wrong_key() {
        let token = service()
            .issue_worker_token(Uuid::new_v4())
            .expect("issue");
        let other = TokenService::new("different-secret", "admin-secret");
        assert!(other.verify_worker_token(&token).is_err());
    }

    #[test]
    fn test_worker_token_rejected_as_admin() {
        let svc = service();
        let token = svc.issue_worker_token(Uuid::new_v4()).expect("issue");
        assert!(svc.verify_admin_token(&token).is_err());
    }

    #[test]
    fn test_admin_token_roundtrip() {
        let svc = service();
        let token = svc
            .issue_admin_token("alice", Duration::minutes(30))
            .expect("issue");
        assert_eq!(svc.verify_admin_token(&token).expect("verify"), "alice");
    }

    #[test]
    fn test_admin_token_expires() {
        let svc = service();
        let token = svc
            .issue_admin_token("alice", Duration::minutes(-5))
            .expect("issue");
        assert!(svc.verify_admin_token(&token).is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let svc = service();
        let mut token = svc.issue_worker_token(Uuid::new_v4()).expect("issue");
        token.push('x');
        assert!(svc.verify_worker_token(&token).is_err());
    }

    #[test]
    fn test_hash_token_deterministic() {
        let a = hash_token("some-token");
        let b = hash_token("some-token");
        let c = hash_token("other-token");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123").expect("ok"), "abc123");
        assert!(extract_bearer_token("Basic abc123").is_err());
        assert!(extract_bearer_token("Bearer ").is_err());
        assert!(extract_bearer_token("abc123").is_err());
    }
}
