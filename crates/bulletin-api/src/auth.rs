use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bulletin_db::Database;
use bulletin_types::api::{AccessTokenResponse, Claims, TokenKind, TokenPair};
use bulletin_types::models::{Identity, Role};

use crate::clock::Clock;
use crate::config::{AdminSeed, AuthSettings, MAX_TTL_MINUTES};
use crate::convert::identity_from_row;
use crate::error::ApiError;

const TOKEN_TYPE: &str = "Bearer";

/// Issues and checks access/refresh tokens and gates role-restricted
/// operations.
///
/// Tokens are stateless HS256 JWTs. Verification always re-reads the
/// subject from the users table, so a deleted user is rejected at once and
/// the returned identity is the live row, not the issuance snapshot.
pub struct AuthManager {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    dummy_hash: String,
}

/// A verified access token together with the identity it resolved to.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub token: String,
    pub identity: Identity,
    pub claims: Claims,
}

impl AccessGrant {
    /// Both the token's audience and the stored role must equal `role`.
    pub fn require_role(&self, role: Role) -> Result<(), ApiError> {
        let claimed = self.claims.role().map_err(|e| ApiError::validation(e.to_string()))?;
        if claimed != role || self.identity.role != role {
            return Err(ApiError::Forbidden(format!("{role} role required")));
        }
        Ok(())
    }
}

impl AuthManager {
    pub fn new(db: Arc<Database>, settings: &AuthSettings, clock: Arc<dyn Clock>) -> Result<Self, ApiError> {
        let secret = settings.jwt_secret.as_bytes();
        Ok(Self {
            db,
            clock,
            access_ttl: token_lifetime("access", settings.access_ttl_minutes)?,
            refresh_ttl: token_lifetime("refresh", settings.refresh_ttl_minutes)?,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            // Verified against when the user id is unknown, so both failure
            // paths cost one Argon2 verification.
            dummy_hash: hash_password("bulletin-timing-equalizer")?,
        })
    }

    /// Seed the administrator if no ADMIN user exists yet.
    pub fn ensure_admin(&self, seed: &AdminSeed) -> Result<bool, ApiError> {
        let password_hash = hash_password(&seed.password)?;
        let created = self.db.seed_user_if_role_missing(
            &seed.user_id,
            &password_hash,
            &seed.user_name,
            Role::Admin.as_str(),
        )?;
        if created {
            info!("Seeded administrator '{}'", seed.user_id);
        }
        Ok(created)
    }

    pub fn authenticate(&self, user_id: &str, password: &str) -> Result<TokenPair, ApiError> {
        let Some(row) = self.db.get_user_by_user_id(user_id)? else {
            let _ = verify_password(password, &self.dummy_hash);
            warn!("Login failed for unknown user id '{}'", user_id);
            return Err(ApiError::InvalidCredentials);
        };

        if !verify_password(password, &row.password_hash) {
            warn!("Login failed for '{}': password mismatch", user_id);
            return Err(ApiError::InvalidCredentials);
        }

        let identity = identity_from_row(&row)?;
        self.db.touch_user(identity.seq)?;

        let access_token = self.issue(&identity, TokenKind::Access)?;
        let refresh_token = self.issue(&identity, TokenKind::Refresh)?;

        info!("User '{}' signed in as {}", identity.user_id, identity.role);
        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Identity, ApiError> {
        self.verify_access_grant(token).map(|grant| grant.identity)
    }

    pub fn verify_access_grant(&self, token: &str) -> Result<AccessGrant, ApiError> {
        let claims = self.decode(token, TokenKind::Access)?;
        claims.role().map_err(|e| ApiError::validation(e.to_string()))?;
        let identity = self.resolve_subject(&claims)?;

        Ok(AccessGrant {
            token: token.to_string(),
            identity,
            claims,
        })
    }

    /// Mint a new access token from a refresh token. The audience comes from
    /// the subject's current stored role. The refresh token stays valid.
    pub fn refresh(&self, refresh_token: &str) -> Result<AccessTokenResponse, ApiError> {
        let claims = self.decode(refresh_token, TokenKind::Refresh)?;
        let identity = self.resolve_subject(&claims)?;

        let access_token = self.issue(&identity, TokenKind::Access)?;
        debug!("Refreshed access token for '{}'", identity.user_id);

        Ok(AccessTokenResponse {
            access_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn require_role(&self, token: &str, role: Role) -> Result<Identity, ApiError> {
        let grant = self.verify_access_grant(token)?;
        grant.require_role(role)?;
        Ok(grant.identity)
    }

    fn issue(&self, identity: &Identity, kind: TokenKind) -> Result<String, ApiError> {
        let now = self.clock.now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: identity.seq.to_string(),
            aud: identity.role.as_str().to_string(),
            exp: now
                .checked_add_signed(ttl)
                .ok_or_else(|| anyhow::anyhow!("{kind} token expiry is out of range"))?
                .timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind,
            identity: (kind == TokenKind::Access).then(|| identity.clone()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(anyhow::Error::from)?;
        Ok(token)
    }

    fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
        // Expiry is judged on the payload alone, before the signature.
        let mut peek = Validation::new(Algorithm::HS256);
        peek.insecure_disable_signature_validation();
        peek.validate_exp = false;
        peek.validate_aud = false;
        let unverified = decode::<Claims>(token, &self.decoding_key, &peek)
            .map_err(|e| {
                debug!("Malformed token: {}", e);
                ApiError::InvalidToken
            })?
            .claims;
        if unverified.exp <= self.clock.now().timestamp() {
            return Err(ApiError::TokenExpired);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                ApiError::InvalidToken
            })?
            .claims;

        if claims.kind != expected {
            return Err(ApiError::WrongTokenKind { expected });
        }
        Ok(claims)
    }

    fn resolve_subject(&self, claims: &Claims) -> Result<Identity, ApiError> {
        let seq: i64 = claims.sub.parse().map_err(|_| ApiError::InvalidToken)?;
        let row = self
            .db
            .get_user_by_seq(seq)?
            .ok_or(ApiError::IdentityNotFound)?;
        identity_from_row(&row)
    }
}

fn token_lifetime(kind: &str, minutes: i64) -> Result<Duration, ApiError> {
    if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
        return Err(ApiError::validation(format!(
            "{kind} token lifetime must be between 1 and {MAX_TTL_MINUTES} minutes"
        )));
    }
    Duration::try_minutes(minutes)
        .ok_or_else(|| ApiError::validation(format!("{kind} token lifetime is out of range")))
}

/// Hash with Argon2id and a fresh random salt; returns the PHC string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Constant-time check of `password` against a stored PHC string. An
/// unparsable hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        warn!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
