use crate::db::DashboardDb;
use crate::models::*;
use anyhow::{Context, Result};

pub struct AlertManager {
    db: DashboardDb,
}

impl AlertManager {
    pub fn new(db: DashboardDb) -> Self {
        Self { db }
    }

    /// Create a new alert, active by default
    pub async fn create_alert(&self, user_id: i64, alert: AlertInput) -> Result<Alert> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO alerts (user_id, symbol, alert_type, threshold)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(alert.symbol.trim().to_uppercase())
        .bind(&alert.alert_type)
        .bind(alert.threshold)
        .fetch_one(self.db.pool())
        .await?;

        self.get_alert(user_id, id)
            .await?
            .context("alert vanished after insert")
    }

    /// Get all alerts owned by a user, newest first
    pub async fn get_alerts(&self, user_id: i64) -> Result<Vec<Alert>> {
        let alerts = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(alerts)
    }

    /// Get alert by ID
    pub async fn get_alert(&self, user_id: i64, id: i64) -> Result<Option<Alert>> {
        let alert = sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(alert)
    }

    /// Partial update; fields left as `None` are untouched
    pub async fn update_alert(
        &self,
        user_id: i64,
        id: i64,
        update: AlertUpdate,
    ) -> Result<Option<Alert>> {
        let result = sqlx::query(
            r#"
            UPDATE alerts SET
                alert_type = COALESCE(?, alert_type),
                threshold = COALESCE(?, threshold),
                is_active = COALESCE(?, is_active)
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&update.alert_type)
        .bind(update.threshold)
        .bind(update.is_active)
        .bind(id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_alert(user_id, id).await
    }

    pub async fn delete_alert(&self, user_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
