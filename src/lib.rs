//! Order workflow and commission ledger.
//!
//! [`OrderService`] drives orders from creation to settlement and
//! [`CommissionLedger`] derives referral commission rows from closed orders.
//! Both run over an [`domain::ports::OrderStore`]: [`DieselOrderStore`] for
//! PostgreSQL, [`MemoryOrderStore`] for tests and embedding.
//!
//! The crate serves no HTTP itself. [`errors::AppError`] is the error type
//! for an HTTP layer built on top: it converts from [`OrderError`] and
//! implements actix-web's `ResponseError`, so handlers can return it as is.

pub mod application;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod infrastructure;
pub mod schema;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub use application::commission::{CommissionLedger, CommissionRunReport, LedgerOptions};
pub use application::order_service::OrderService;
pub use application::settings::{CommissionSettings, CommissionSnapshot};
pub use db::{create_pool, DbPool};
pub use domain::errors::OrderError;
pub use infrastructure::memory::MemoryOrderStore;
pub use infrastructure::order_repo::DieselOrderStore;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), OrderError> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| OrderError::store(format!("failed to run database migrations: {e}")))?;
    Ok(())
}
