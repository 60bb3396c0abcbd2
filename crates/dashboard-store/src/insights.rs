use crate::db::DashboardDb;
use crate::models::Insight;
use anyhow::Result;

pub const DEFAULT_INSIGHT_LIMIT: u32 = 10;
pub const MAX_INSIGHT_LIMIT: u32 = 50;

/// Append-only log of analysis responses, refusals included.
pub struct InsightLog {
    db: DashboardDb,
}

impl InsightLog {
    pub fn new(db: DashboardDb) -> Self {
        Self { db }
    }

    pub async fn record(&self, user_id: i64, query: &str, response: &str) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO ai_insights (user_id, query, response)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(query)
        .bind(response)
        .fetch_one(self.db.pool())
        .await?;

        Ok(id)
    }

    /// The user's latest insights, newest first. `limit` is clamped to
    /// `1..=MAX_INSIGHT_LIMIT`.
    pub async fn recent(&self, user_id: i64, limit: u32) -> Result<Vec<Insight>> {
        let limit = limit.clamp(1, MAX_INSIGHT_LIMIT);

        let insights = sqlx::query_as::<_, Insight>(
            r#"
            SELECT * FROM ai_insights
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await?;

        Ok(insights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, user};

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let db = memory_db().await;
        let alice = user(&db, "alice").await;
        let log = InsightLog::new(db);

        for i in 0..5 {
            log.record(alice.id, &format!("query {}", i), "answer").await.unwrap();
        }

        let recent = log.recent(alice.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].query, "query 4");
        assert_eq!(recent[2].query, "query 2");
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let db = memory_db().await;
        let alice = user(&db, "alice").await;
        let log = InsightLog::new(db);
        log.record(alice.id, "a", "b").await.unwrap();
        log.record(alice.id, "c", "d").await.unwrap();

        assert_eq!(log.recent(alice.id, 0).await.unwrap().len(), 1);
        assert_eq!(log.recent(alice.id, 500).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insights_are_per_user() {
        let db = memory_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let log = InsightLog::new(db);
        log.record(alice.id, "q", "r").await.unwrap();

        assert!(log.recent(bob.id, 10).await.unwrap().is_empty());
    }
}
