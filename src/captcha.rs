//! Cloudflare Turnstile bot verification.
//!
//! Task submission is the one unauthenticated write path, so it is gated by
//! a Turnstile challenge. Rejection aborts the request before any queue
//! mutation. When no secret key is configured the check is skipped, which is
//! intended for development and tests only.

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

const VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Bot verification errors.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("Turnstile token required")]
    MissingToken,

    #[error("Turnstile verification failed")]
    Rejected,

    #[error("Captcha verification service unavailable: {0}")]
    ServiceUnavailable(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Verifies client-supplied Turnstile tokens against Cloudflare.
#[derive(Clone)]
pub struct CaptchaVerifier {
    client: reqwest::Client,
    secret_key: Option<String>,
}

impl CaptchaVerifier {
    pub fn new(secret_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
        }
    }

    /// A verifier that accepts everything. Development and tests only.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Returns whether verification is actually enforced.
    pub fn enabled(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Verifies a token, erroring on rejection or upstream failure.
    pub async fn verify(&self, token: &str) -> Result<(), CaptchaError> {
        let Some(secret) = &self.secret_key else {
            return Ok(());
        };

        if token.is_empty() {
            return Err(CaptchaError::MissingToken);
        }

        let response: SiteVerifyResponse = self
            .client
            .post(VERIFY_URL)
            .json(&serde_json::json!({ "secret": secret, "response": token }))
            .send()
            .await?
            .json()
            .await?;

        if !response.success {
            warn!(error_codes = ?response.error_codes, "Turnstile verification rejected token");
            return Err(CaptchaError::Rejected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_verifier_accepts_anything() {
        let verifier = CaptchaVerifier::disabled();
        assert!(!verifier.enabled());
        assert!(verifier.verify("").await.is_ok());
        assert!(verifier.verify("whatever").await.is_ok());
    }

    #[tokio::test]
    async fn test_enabled_verifier_requires_token() {
        let verifier = CaptchaVerifier::new(Some("secret".to_string()));
        assert!(verifier.enabled());
        assert!(matches!(
            verifier.verify("").await,
            Err(CaptchaError::MissingToken)
        ));
    }

    #[test]
    fn test_site_verify_response_parsing() {
        let raw = r#"{"success": false, "error-codes": ["invalid-input-response"]}"#;
        let parsed: SiteVerifyResponse = serde_json::from_str(raw).expect("parse");
        assert!(!parsed.success);
        assert_eq!(parsed.error_codes, vec!["invalid-input-response"]);
    }
}
