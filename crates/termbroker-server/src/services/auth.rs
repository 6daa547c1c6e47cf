//! Bearer-token authentication: argon2 password hashing plus JWT issuance.

use anyhow::{Context, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::storage::Database;

pub struct AuthService {
    db: Arc<Database>,
    jwt_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}

pub struct AuthTokens {
    pub access_token: String,
    pub token_type: &'static str,
}

impl AuthService {
    pub fn new(db: Arc<Database>, jwt_secret: String) -> Self {
        Self { db, jwt_secret }
    }

    /// Creates a user with a hashed password. There is no public register
    /// endpoint; operators provision accounts out of band (env var, seed
    /// script, or direct table insert) and this stays available for that.
    pub async fn register(&self, username: &str, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?
            .to_string();

        self.db.create_user(username, &password_hash).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthTokens> {
        let user = self
            .db
            .get_user_by_username(username)
            .await
            .context("looking up user")?;

        let Some((_user_id, password_hash)) = user else {
            anyhow::bail!("invalid credentials");
        };

        let parsed_hash = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("corrupt password hash: {e}"))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            anyhow::bail!("invalid credentials");
        }

        self.generate_token(username)
    }

    pub fn validate_token(&self, token: &str) -> Result<String> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims.sub)
    }

    fn generate_token(&self, user_id: &str) -> Result<AuthTokens> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + Duration::hours(24)).timestamp(),
            iat: now.timestamp(),
        };
        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(AuthTokens {
            access_token,
            token_type: "bearer",
        })
    }
}
