use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session claims issued by the identity provider; `sub` is the user's UUID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Signs a session token. Sessions normally come from the identity
    /// provider; this is used by operational tooling and tests.
    pub fn issue_token(&self, user_id: Uuid, ttl_secs: i64) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
            iat: Some(now.timestamp()),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(AppError::JwtError)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // identity providers set an audience we do not pin
        validation.validate_aud = false;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::JwtError)
    }

    /// Verifies the token and returns the caller's user id.
    pub fn authenticate(&self, token: &str) -> AppResult<Uuid> {
        let claims = self.verify_token(token)?;
        Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_authenticate() {
        let jwt = JwtService::new("secret");
        let user = Uuid::new_v4();
        let token = jwt.issue_token(user, 60).unwrap();
        assert_eq!(jwt.authenticate(&token).unwrap(), user);
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let token = JwtService::new("other").issue_token(Uuid::new_v4(), 60).unwrap();
        assert!(JwtService::new("secret").authenticate(&token).is_err());
    }

    #[test]
    fn test_rejects_expired_token() {
        let jwt = JwtService::new("secret");
        let token = jwt.issue_token(Uuid::new_v4(), -3600).unwrap();
        assert!(jwt.verify_token(&token).is_err());
    }
}
