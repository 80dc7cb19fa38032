//! User records and the stores that own them.
//!
//! Handlers only talk to [`UserStore`]; password hashes never leave the store.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{Connection, PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

/// Result of trying to insert a new user.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(User),
    /// The email is already registered (unique constraint).
    Conflict,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Hash `password` and insert a new user. Must be atomic with respect to
    /// concurrent registrations of the same email.
    async fn create_user(&self, email: &str, password: &SecretString) -> Result<CreateOutcome>;

    /// Return the user when `password` matches the stored hash.
    async fn verify_login(&self, email: &str, password: &SecretString) -> Result<Option<User>>;

    /// Cheap liveness probe for `/health`.
    async fn ping(&self) -> Result<()>;
}

/// Hash a password into a PHC string (Argon2id, random salt).
///
/// Runs on the blocking pool; Argon2 is deliberately slow.
pub async fn hash_password(password: &SecretString) -> Result<String> {
    let password = password.clone();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| anyhow!("failed to hash password"))
    })
    .await
    .context("password hashing task failed")?
}

pub async fn verify_password(password: &SecretString, stored_hash: &str) -> Result<bool> {
    let password = password.clone();
    let stored_hash = stored_hash.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored_hash).map_err(|_| anyhow!("invalid stored password hash"))?;
        Ok(Argon2::default()
            .verify_password(password.expose_secret().as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .context("password verification task failed")?
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = "SELECT id, email FROM users WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;

        Ok(row.map(|row| User {
            id: row.get("id"),
            email: row.get("email"),
        }))
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT id, email FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;

        Ok(row.map(|row| User {
            id: row.get("id"),
            email: row.get("email"),
        }))
    }

    async fn create_user(&self, email: &str, password: &SecretString) -> Result<CreateOutcome> {
        let password_hash = hash_password(password).await?;
        let id = Uuid::new_v4();

        let query = r"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(email)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created(User {
                id,
                email: email.to_string(),
            })),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn verify_login(&self, email: &str, password: &SecretString) -> Result<Option<User>> {
        let query = "SELECT id, email, password_hash FROM users WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup login record")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored_hash: String = row.get("password_hash");
        if verify_password(password, &stored_hash).await? {
            Ok(Some(User {
                id: row.get("id"),
                email: row.get("email"),
            }))
        } else {
            Ok(None)
        }
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}

struct StoredUser {
    user: User,
    password_hash: String,
}

/// Process-local user store, keyed by email.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, StoredUser>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .get(email)
            .map(|stored| stored.user.clone()))
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|stored| stored.user.id == id)
            .map(|stored| stored.user.clone()))
    }

    async fn create_user(&self, email: &str, password: &SecretString) -> Result<CreateOutcome> {
        // Hash before taking the write lock; the insert itself re-checks.
        let password_hash = hash_password(password).await?;

        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Ok(CreateOutcome::Conflict);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
        };
        users.insert(
            email.to_string(),
            StoredUser {
                user: user.clone(),
                password_hash,
            },
        );

        Ok(CreateOutcome::Created(user))
    }

    async fn verify_login(&self, email: &str, password: &SecretString) -> Result<Option<User>> {
        let record = self
            .users
            .read()
            .await
            .get(email)
            .map(|stored| (stored.user.clone(), stored.password_hash.clone()));

        let Some((user, stored_hash)) = record else {
            return Ok(None);
        };

        if verify_password(password, &stored_hash).await? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
