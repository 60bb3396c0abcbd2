use crate::db::DashboardDb;
use crate::models::*;
use anyhow::{Context, Result};

pub struct UserManager {
    db: DashboardDb,
}

impl UserManager {
    pub fn new(db: DashboardDb) -> Self {
        Self { db }
    }

    /// Insert a user. Email and username are unique; callers check first
    /// to report which one collided.
    pub async fn create(&self, user: NewUser) -> Result<User> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users (email, username, full_name, hashed_password)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(&user.hashed_password)
        .fetch_one(self.db.pool())
        .await?;

        self.get(id)
            .await?
            .context("user vanished after insert")
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(user)
    }

    /// Apply the provided fields; absent fields keep their stored value.
    pub async fn update(&self, id: i64, update: UserUpdate) -> Result<Option<User>> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = COALESCE(?, email),
                username = COALESCE(?, username),
                full_name = COALESCE(?, full_name),
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(&update.email)
        .bind(&update.username)
        .bind(&update.full_name)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(id).await
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE users SET is_active = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }
}
