use crate::db::DashboardDb;
use crate::models::*;
use anyhow::{Context, Result};

/// Portfolios and their holdings. Every portfolio query is scoped to its
/// owner, so a foreign id behaves exactly like a missing one.
pub struct PortfolioManager {
    db: DashboardDb,
}

impl PortfolioManager {
    pub fn new(db: DashboardDb) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: i64, input: PortfolioInput) -> Result<Portfolio> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO portfolios (user_id, name, description)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(self.db.pool())
        .await?;

        self.get(user_id, id)
            .await?
            .context("portfolio vanished after insert")
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<Portfolio>> {
        let portfolios = sqlx::query_as::<_, Portfolio>(
            "SELECT * FROM portfolios WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(portfolios)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Option<Portfolio>> {
        let portfolio = sqlx::query_as::<_, Portfolio>(
            "SELECT * FROM portfolios WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(portfolio)
    }

    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        update: PortfolioUpdate,
    ) -> Result<Option<Portfolio>> {
        let result = sqlx::query(
            r#"
            UPDATE portfolios SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                updated_at = datetime('now')
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&update.name)
        .bind(&update.description)
        .bind(id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(user_id, id).await
    }

    /// Delete a portfolio together with its holdings. Returns false when
    /// the user owns no such portfolio.
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let owned = sqlx::query("DELETE FROM portfolios WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if owned {
            sqlx::query("DELETE FROM holdings WHERE portfolio_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(owned)
    }

    /// Symbols are stored upper-cased.
    pub async fn add_holding(
        &self,
        portfolio_id: i64,
        input: HoldingInput,
    ) -> Result<HoldingRecord> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO holdings (portfolio_id, symbol, quantity, average_price)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(portfolio_id)
        .bind(input.symbol.trim().to_uppercase())
        .bind(input.quantity)
        .bind(input.average_price)
        .fetch_one(self.db.pool())
        .await?;

        self.get_holding(portfolio_id, id)
            .await?
            .context("holding vanished after insert")
    }

    pub async fn list_holdings(&self, portfolio_id: i64) -> Result<Vec<HoldingRecord>> {
        let holdings = sqlx::query_as::<_, HoldingRecord>(
            "SELECT * FROM holdings WHERE portfolio_id = ? ORDER BY id",
        )
        .bind(portfolio_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(holdings)
    }

    pub async fn get_holding(&self, portfolio_id: i64, id: i64) -> Result<Option<HoldingRecord>> {
        let holding = sqlx::query_as::<_, HoldingRecord>(
            "SELECT * FROM holdings WHERE id = ? AND portfolio_id = ?",
        )
        .bind(id)
        .bind(portfolio_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(holding)
    }

    pub async fn update_holding(
        &self,
        portfolio_id: i64,
        id: i64,
        update: HoldingUpdate,
    ) -> Result<Option<HoldingRecord>> {
        let result = sqlx::query(
            r#"
            UPDATE holdings SET
                quantity = COALESCE(?, quantity),
                average_price = COALESCE(?, average_price),
                updated_at = datetime('now')
            WHERE id = ? AND portfolio_id = ?
            "#,
        )
        .bind(update.quantity)
        .bind(update.average_price)
        .bind(id)
        .bind(portfolio_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_holding(portfolio_id, id).await
    }

    pub async fn delete_holding(&self, portfolio_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM holdings WHERE id = ? AND portfolio_id = ?")
            .bind(id)
            .bind(portfolio_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Holdings of a portfolio in the shape the valuator consumes
    pub async fn positions(&self, portfolio_id: i64) -> Result<Vec<market_core::Holding>> {
        let holdings = self.list_holdings(portfolio_id).await?;
        Ok(holdings.iter().map(HoldingRecord::position).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, user};

    fn input(name: &str) -> PortfolioInput {
        PortfolioInput {
            name: name.to_string(),
            description: Some("long term".to_string()),
        }
    }

    fn holding(symbol: &str, quantity: f64, average_price: f64) -> HoldingInput {
        HoldingInput {
            symbol: symbol.to_string(),
            quantity,
            average_price,
        }
    }

    #[tokio::test]
    async fn test_portfolio_crud() {
        let db = memory_db().await;
        let alice = user(&db, "alice").await;
        let manager = PortfolioManager::new(db);

        let created = manager.create(alice.id, input("Core")).await.unwrap();
        assert_eq!(created.name, "Core");
        assert_eq!(created.user_id, alice.id);

        let updated = manager
            .update(
                alice.id,
                created.id,
                PortfolioUpdate {
                    name: Some("Core Holdings".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Core Holdings");
        assert_eq!(updated.description.as_deref(), Some("long term"));

        assert_eq!(manager.list(alice.id).await.unwrap().len(), 1);
        assert!(manager.delete(alice.id, created.id).await.unwrap());
        assert!(manager.get(alice.id, created.id).await.unwrap().is_none());
        assert!(!manager.delete(alice.id, created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_portfolio_is_invisible() {
        let db = memory_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let manager = PortfolioManager::new(db);

        let created = manager.create(alice.id, input("Core")).await.unwrap();

        assert!(manager.get(bob.id, created.id).await.unwrap().is_none());
        assert!(manager.list(bob.id).await.unwrap().is_empty());
        assert!(manager
            .update(bob.id, created.id, PortfolioUpdate::default())
            .await
            .unwrap()
            .is_none());
        assert!(!manager.delete(bob.id, created.id).await.unwrap());
        assert!(manager.get(alice.id, created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_holdings_crud_and_positions() {
        let db = memory_db().await;
        let alice = user(&db, "alice").await;
        let manager = PortfolioManager::new(db);
        let portfolio = manager.create(alice.id, input("Core")).await.unwrap();

        let aapl = manager
            .add_holding(portfolio.id, holding(" aapl ", 10.0, 100.0))
            .await
            .unwrap();
        assert_eq!(aapl.symbol, "AAPL");
        manager
            .add_holding(portfolio.id, holding("MSFT", 2.0, 250.0))
            .await
            .unwrap();

        let updated = manager
            .update_holding(
                portfolio.id,
                aapl.id,
                HoldingUpdate {
                    quantity: Some(12.0),
                    average_price: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.quantity, 12.0);
        assert_eq!(updated.average_price, 100.0);

        let positions = manager.positions(portfolio.id).await.unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0], market_core::Holding::new("AAPL", 12.0, 100.0));

        assert!(manager.delete_holding(portfolio.id, aapl.id).await.unwrap());
        assert!(!manager.delete_holding(portfolio.id, aapl.id).await.unwrap());
        assert_eq!(manager.list_holdings(portfolio.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_portfolio_removes_holdings() {
        let db = memory_db().await;
        let alice = user(&db, "alice").await;
        let manager = PortfolioManager::new(db);
        let portfolio = manager.create(alice.id, input("Core")).await.unwrap();
        manager
            .add_holding(portfolio.id, holding("AAPL", 1.0, 1.0))
            .await
            .unwrap();

        assert!(manager.delete(alice.id, portfolio.id).await.unwrap());
        assert!(manager.list_holdings(portfolio.id).await.unwrap().is_empty());
    }
}
