//! The independent JWT middleware from spec §4.6: authenticates a user
//! directly (root controller, `/authorize`, `/approve`) rather than
//! through a delegate's access token. Mirrors `toka-auth::hs256` for
//! claims shape and validation.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a user's session JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// The authenticated user's id; doubles as their realm.
    pub sub: String,
    /// Token issuer.
    pub iss: String,
    /// Token audience.
    pub aud: String,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Optional coarse role, not used by the delegation core itself.
    #[serde(default)]
    pub role: Option<String>,
}

/// Validates user JWTs against a configured secret, issuer, and
/// audience.
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    issuer: String,
    audience: String,
}

impl JwtValidator {
    /// Build a validator. `secret` should be at least 32 bytes -
    /// enforced by [`crate::config::CasfaConfig::validate`], not here.
    pub fn new(secret: String, issuer: String, audience: String) -> Self {
        Self { secret, issuer, audience }
    }

    /// Decode and validate `token`, returning its claims on success.
    pub fn validate(&self, token: &str) -> Result<UserClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        let data = decode::<UserClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, iss: &str, aud: &str, exp: i64) -> String {
        let claims = UserClaims {
            sub: "usr_alice".to_string(),
            iss: iss.to_string(),
            aud: aud.to_string(),
            exp,
            iat: 0,
            role: None,
        };
        encode(&Header::new(jsonwebtoken::Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn validates_well_formed_token() {
        let secret = "x".repeat(32);
        let validator = JwtValidator::new(secret.clone(), "casfa".to_string(), "casfa-api".to_string());
        let token = make_token(&secret, "casfa", "casfa-api", 9_999_999_999);
        let claims = validator.validate(&token).unwrap();
        assert_eq!(claims.sub, "usr_alice");
    }

    #[test]
    fn rejects_wrong_issuer() {
        let secret = "x".repeat(32);
        let validator = JwtValidator::new(secret.clone(), "casfa".to_string(), "casfa-api".to_string());
        let token = make_token(&secret, "someone-else", "casfa-api", 9_999_999_999);
        assert!(validator.validate(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let secret = "x".repeat(32);
        let validator = JwtValidator::new(secret.clone(), "casfa".to_string(), "casfa-api".to_string());
        let token = make_token(&secret, "casfa", "casfa-api", 1);
        assert!(validator.validate(&token).is_err());
    }
}
