use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Portfolio {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A stored position; `market_core::Holding` is the valuation view of it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HoldingRecord {
    pub id: i64,
    pub portfolio_id: i64,
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl HoldingRecord {
    pub fn position(&self) -> market_core::Holding {
        market_core::Holding::new(&self.symbol, self.quantity, self.average_price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingInput {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldingUpdate {
    pub quantity: Option<f64>,
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alert {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub alert_type: String, // "price_above", "price_below", ...
    pub threshold: f64,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInput {
    pub symbol: String,
    pub alert_type: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertUpdate {
    pub alert_type: Option<String>,
    pub threshold: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Insight {
    pub id: i64,
    pub user_id: i64,
    pub query: String,
    pub response: String,
    pub created_at: String,
}
