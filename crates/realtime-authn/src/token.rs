//! `ValidateToken(jwt) -> claims | error` (spec.md §6). Backs both the
//! initial `access_token` supplied in a join payload and later
//! `access_token` refresh frames (§4.2, §9 "Claims refresh").

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use realtime_common::Claims;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("token expired")]
    Expired,
    #[error("malformed or unsigned token: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Claims, AuthnError>;
}

/// Reference implementation: HS256-signed JWTs, the same shared-secret
/// scheme `jtjenkins-Together`'s gateway uses at its own WebSocket
/// upgrade boundary, adapted here to hand back an untyped claims map
/// rather than a fixed `Claims` struct — subscriptions need arbitrary
/// claim keys for RLS predicates (`claims.<key>`), not a closed set.
pub struct JwtTokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenValidator {
    pub fn new(hmac_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            decoding_key: DecodingKey::from_secret(hmac_secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, token: &str) -> Result<Claims, AuthnError> {
        let data = decode::<BTreeMap<String, Value>>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthnError::Expired,
                other => AuthnError::Invalid(other.to_string()),
            },
        )?;
        Ok(Claims::new(data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn token_with_claims(secret: &str, claims: BTreeMap<String, Value>, exp_in_future: bool) -> String {
        let mut claims = claims;
        let exp = if exp_in_future {
            chrono::Utc::now().timestamp() + 3600
        } else {
            chrono::Utc::now().timestamp() - 3600
        };
        claims.insert("exp".to_string(), json!(exp));
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_claims_map() {
        let validator = JwtTokenValidator::new("s3cret");
        let mut claims = BTreeMap::new();
        claims.insert("sub".to_string(), json!("U1"));
        claims.insert("org_id".to_string(), json!(99));
        let token = token_with_claims("s3cret", claims, true);

        let parsed = validator.validate(&token).await.unwrap();
        assert_eq!(parsed.uid(), Some("U1"));
        assert_eq!(parsed.get("org_id"), Some(&json!(99)));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let validator = JwtTokenValidator::new("s3cret");
        let token = token_with_claims("s3cret", BTreeMap::new(), false);
        assert!(matches!(validator.validate(&token).await, Err(AuthnError::Expired)));
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let validator = JwtTokenValidator::new("s3cret");
        let token = token_with_claims("other-secret", BTreeMap::new(), true);
        assert!(validator.validate(&token).await.is_err());
    }
}
