//! Authentication service for registration, login, and token management

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{normalize_email, User, UserRole};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// Self sign-up of a client account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom = "shared::password")]
    pub password: String,
    #[validate(custom = "shared::phone")]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub company: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 120))]
    pub city: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordInput {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(custom = "shared::password")]
    pub new_password: String,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, role: UserRole, profile_id: Option<Uuid>, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            role,
            profile_id: profile_id.map(|id| id.to_string()),
            exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn encode_access_token(claims: &Claims, secret: &str) -> AppResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Decode and validate an access token
pub fn decode_access_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })
}

/// Who the tokens belong to
#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub profile_id: Option<Uuid>,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: SessionUser,
}

/// User row including the password hash
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    role: UserRole,
    is_active: bool,
}

const USER_COLUMNS: &str =
    "id, email, name, role, is_active, last_login_at, created_at, updated_at";

/// Hash a password with bcrypt
pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Create a login on an open connection or transaction.
///
/// Fails with a conflict when the email is taken.
pub(crate) async fn insert_user(
    conn: &mut PgConnection,
    email: &str,
    password: &str,
    name: &str,
    role: UserRole,
) -> AppResult<Uuid> {
    let email = normalize_email(email);

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(&mut *conn)
        .await?;

    if existing > 0 {
        return Err(AppError::Conflict {
            resource: "email".to_string(),
            message: "An account with this email already exists".to_string(),
        });
    }

    let password_hash = hash_password(password)?;

    let user_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO users (email, password_hash, name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(name.trim())
    .bind(role)
    .fetch_one(&mut *conn)
    .await?;

    Ok(user_id)
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Register a client account together with its client profile
    pub async fn register(&self, input: RegisterInput) -> AppResult<AuthTokens> {
        input.validate()?;
        let email = normalize_email(&input.email);

        let mut tx = self.db.begin().await?;

        let user_id = insert_user(&mut *tx, &email, &input.password, &input.name, UserRole::Client).await?;

        let client_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO clients (user_id, name, email, phone, company, address, city)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(input.name.trim())
        .bind(&email)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(&input.address)
        .bind(&input.city)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%user_id, %client_id, "Registered client account");

        let user = SessionUser {
            id: user_id,
            email,
            name: input.name.trim().to_string(),
            role: UserRole::Client,
            profile_id: Some(client_id),
        };
        self.issue_tokens(user).await
    }

    /// Authenticate user with email and password
    pub async fn login(&self, input: LoginInput) -> AppResult<AuthTokens> {
        input.validate()?;

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, name, role, is_active
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(&input.email))
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        // Verify password
        let valid = verify(&input.password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let profile_id = self.profile_id(user.id, user.role).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

        self.issue_tokens(SessionUser {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            profile_id,
        })
        .await
    }

    /// Exchange a refresh token for a new token pair; the old one is revoked
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let user_id: Uuid = sqlx::query_scalar(ROTATE_REFRESH_TOKEN)
            .bind(hash_token(refresh_token))
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(invalid_refresh_token)?;

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.email, u.password_hash, u.name, u.role, u.is_active
            FROM users u
            WHERE u.id = $1 AND u.is_active = true
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(invalid_refresh_token)?;

        let profile_id = self.profile_id(user.id, user.role).await?;

        self.issue_tokens(SessionUser {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            profile_id,
        })
        .await
    }

    /// Revoke one of the user's refresh tokens; unknown tokens are ignored
    pub async fn logout(&self, user_id: Uuid, refresh_token: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = NOW()
            WHERE token_hash = $1 AND user_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(hash_token(refresh_token))
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Current user with the linked profile id
    pub async fn me(&self, user_id: Uuid) -> AppResult<(User, Option<Uuid>)> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

        let profile_id = self.profile_id(user.id, user.role).await?;
        Ok((user, profile_id))
    }

    /// Change password and sign out every other session
    pub async fn change_password(&self, user_id: Uuid, input: ChangePasswordInput) -> AppResult<()> {
        input.validate()?;

        let current_hash = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

        let valid = verify(&input.current_password, &current_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            return Err(AppError::validation("current_password", "Current password is incorrect"));
        }

        let new_hash = hash_password(&input.new_password)?;

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(&new_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(%user_id, "Password changed");
        Ok(())
    }

    /// Create the configured admin account when no admin exists yet
    pub async fn ensure_admin(&self, config: &Config) -> AppResult<()> {
        let (Some(email), Some(password)) = (&config.admin.email, &config.admin.password) else {
            return Ok(());
        };

        let admins = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.db)
            .await?;
        if admins > 0 {
            return Ok(());
        }

        let name = config.admin.name.as_deref().unwrap_or("Administrator");
        let mut conn = self.db.acquire().await?;
        let user_id = insert_user(&mut *conn, email, password, name, UserRole::Admin).await?;
        tracing::info!(%user_id, "Created bootstrap admin account");
        Ok(())
    }

    /// Client or technician id linked to the user
    async fn profile_id(&self, user_id: Uuid, role: UserRole) -> AppResult<Option<Uuid>> {
        let query = match role {
            UserRole::Admin => return Ok(None),
            UserRole::Client => "SELECT id FROM clients WHERE user_id = $1",
            UserRole::Technician => "SELECT id FROM technicians WHERE user_id = $1",
        };

        let profile_id = sqlx::query_scalar::<_, Uuid>(query)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(profile_id)
    }

    /// Generate and persist an access/refresh token pair
    async fn issue_tokens(&self, user: SessionUser) -> AppResult<AuthTokens> {
        let claims = Claims::new(user.id, user.role, user.profile_id, self.access_token_expiry);
        let access_token = encode_access_token(&claims, &self.jwt_secret)?;

        // Refresh token (simple random token)
        let refresh_token = Uuid::new_v4().to_string();
        self.store_refresh_token(user.id, &refresh_token).await?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
            user,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(hash_token(token))
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

/// Hash a refresh token for storage
/// Validity check and revocation in one statement, so a token replayed
/// concurrently is honoured at most once
const ROTATE_REFRESH_TOKEN: &str = r#"
    UPDATE refresh_tokens SET revoked_at = NOW()
    WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > NOW()
    RETURNING user_id
"#;

fn invalid_refresh_token() -> AppError {
    AppError::Unauthorized("Invalid or expired refresh token".to_string())
}

fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
