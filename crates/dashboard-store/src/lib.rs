pub mod alerts;
pub mod db;
pub mod insights;
pub mod models;
pub mod portfolios;
pub mod users;

pub use alerts::AlertManager;
pub use db::DashboardDb;
pub use insights::InsightLog;
pub use models::*;
pub use portfolios::PortfolioManager;
pub use users::UserManager;
