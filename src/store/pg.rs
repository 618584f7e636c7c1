use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{NewUser, Role, StoreError, TokenRing, User, UserStore};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, refresh_tokens, created_at, updated_at";

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    refresh_tokens: Vec<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown role {:?}", row.role).into()))?;
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_active: row.is_active,
            refresh_tokens: TokenRing::from_parts(row.refresh_tokens),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&new.username)
            .bind(new.email.to_lowercase())
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate
                } else {
                    StoreError::Backend(e)
                }
            })?;
        Ok(row.try_into()?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose().map_err(Into::into)
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = lower($1)"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose().map_err(Into::into)
    }

    async fn push_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let tokens: Option<Vec<String>> =
            sqlx::query_scalar("SELECT refresh_tokens FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(tokens) = tokens else {
            return Ok(());
        };
        let mut ring = TokenRing::from_parts(tokens);
        ring.push(token.to_string());
        sqlx::query("UPDATE users SET refresh_tokens = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(ring.into_vec())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        old: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        // Row lock makes remove+append a single critical section; a concurrent
        // redemption of the same token observes it as absent and loses.
        let mut tx = self.pool.begin().await?;
        let tokens: Option<Vec<String>> =
            sqlx::query_scalar("SELECT refresh_tokens FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(tokens) = tokens else {
            return Ok(false);
        };
        let mut ring = TokenRing::from_parts(tokens);
        if !ring.remove(old) {
            return Ok(false);
        }
        ring.push(new.to_string());
        sqlx::query("UPDATE users SET refresh_tokens = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(ring.into_vec())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users
             SET refresh_tokens = array_remove(refresh_tokens, $2), updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
