//! HS256 access tokens.
//!
//! A token names the user (`sub`), the tenant they logged into (`tid`) and
//! the role they held there. The role is advisory: every request re-reads
//! the membership of the tenant it acts on.

use campus_core::roles::Role;
use campus_core::types::DbId;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{env_or, env_required, ConfigError};

/// `iss` of every token this server signs.
pub const ISSUER: &str = "campus-api";

const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id.
    pub sub: DbId,
    /// Tenant selected at login.
    pub tid: DbId,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

impl Claims {
    /// Fresh claims for `user_id` acting in `tenant_id`.
    pub fn issue(user_id: DbId, tenant_id: DbId, role: Role, config: &JwtConfig) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id,
            tid: tenant_id,
            role,
            exp: now + config.access_token_expiry_mins * 60,
            iat: now,
            iss: ISSUER.to_string(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_role(self, role: Role) -> Self {
        Self { role, ..self }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 signing secret.
    pub secret: String,
    pub access_token_expiry_mins: i64,
}

impl JwtConfig {
    pub fn new(secret: String, access_token_expiry_mins: i64) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                message: format!("must be at least {MIN_SECRET_BYTES} bytes"),
            });
        }
        if access_token_expiry_mins <= 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_ACCESS_EXPIRY_MINS",
                message: "must be positive".into(),
            });
        }
        Ok(Self {
            secret,
            access_token_expiry_mins,
        })
    }

    /// | Env Var                  | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `JWT_SECRET`             | **yes**  | --      |
    /// | `JWT_ACCESS_EXPIRY_MINS` | no       | `15`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(
            env_required("JWT_SECRET")?,
            env_or("JWT_ACCESS_EXPIRY_MINS", DEFAULT_ACCESS_EXPIRY_MINS)?,
        )
    }
}

pub fn sign(claims: &Claims, config: &JwtConfig) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Sign a fresh token for `user_id` acting in `tenant_id`.
pub fn generate_access_token(
    user_id: DbId,
    tenant_id: DbId,
    role: Role,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    sign(&Claims::issue(user_id, tenant_id, role, config), config)
}

/// Check signature, expiry and issuer, returning the embedded [`Claims`].
pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::types::new_id;

    fn config() -> JwtConfig {
        JwtConfig::new("an-hmac-secret-of-thirty-two-bytes!".to_string(), 15).unwrap()
    }

    #[test]
    fn issued_token_round_trips_its_claims() {
        let config = config();
        let (user, tenant) = (new_id(), new_id());
        let token = generate_access_token(user, tenant, Role::Advisor, &config).unwrap();

        let claims = validate_token(&token, &config).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.tid, tenant);
        assert_eq!(claims.role, Role::Advisor);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = config();
        let mut claims = Claims::issue(new_id(), new_id(), Role::Student, &config);
        // Beyond the default 60 second leeway.
        claims.exp = claims.iat - 300;
        let token = sign(&claims, &config).unwrap();
        assert!(validate_token(&token, &config).is_err());
    }

    #[test]
    fn token_from_another_issuer_is_rejected() {
        let config = config();
        let mut claims = Claims::issue(new_id(), new_id(), Role::Admin, &config);
        claims.iss = "someone-else".to_string();
        let token = sign(&claims, &config).unwrap();
        assert!(validate_token(&token, &config).is_err());
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let other = JwtConfig::new("a-completely-different-secret-value".to_string(), 15).unwrap();
        let token = generate_access_token(new_id(), new_id(), Role::Student, &config()).unwrap();
        assert!(validate_token(&token, &other).is_err());
    }

    #[test]
    fn short_secret_and_zero_lifetime_are_config_errors() {
        assert!(JwtConfig::new("short".to_string(), 15).is_err());
        assert!(JwtConfig::new("an-hmac-secret-of-thirty-two-bytes!".to_string(), 0).is_err());
    }
}
