//! PostgreSQL durable credential store.
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Postgres;
use crate::credential::{
    CredentialStore, EncryptedCredential, StoreError, UserIdentity, UserProfile,
};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "creator_desk";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { postgres })
    }

    /// Connect using the `postgres` section of `config.yaml`.
    pub async fn from_config(config: &Postgres) -> Result<Self, sqlx::Error> {
        Self::new(
            &config.address,
            config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
            config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
            config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME),
            config.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
        )
        .await
    }

    /// Run pending migration scripts.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.postgres).await
    }
}

/// PostgreSQL implementation of [`CredentialStore`].
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new [`PgCredentialStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<&Database> for PgCredentialStore {
    fn from(db: &Database) -> Self {
        Self::new(db.postgres.clone())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_encrypted_credential(
        &self,
        user: &UserIdentity,
    ) -> Result<Option<EncryptedCredential>, StoreError> {
        let record = sqlx::query_as::<_, EncryptedCredential>(
            r#"
            SELECT ciphertext, revoked, created_at
            FROM credentials
            WHERE user_id = $1
            "#,
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn put_encrypted_credential(
        &self,
        user: &UserIdentity,
        ciphertext: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO credentials (user_id, ciphertext, revoked, created_at)
            VALUES ($1, $2, false, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET ciphertext = EXCLUDED.ciphertext,
                revoked = false,
                created_at = NOW()
            "#,
        )
        .bind(user.as_str())
        .bind(ciphertext)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn revoke(&self, user: &UserIdentity) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE credentials
            SET revoked = true
            WHERE user_id = $1
            "#,
        )
        .bind(user.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(user_id = %user, "no credential to revoke");
        }

        Ok(())
    }

    async fn save_user(&self, profile: &UserProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                email = EXCLUDED.email
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(&profile.email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user(&self, user: &UserIdentity) -> Result<Option<UserProfile>, StoreError> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, name, email
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }
}
