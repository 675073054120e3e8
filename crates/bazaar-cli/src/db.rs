//! `db` command handlers.

use std::path::Path;

/// # Errors
///
/// Returns an error if the database is unreachable.
pub(crate) async fn run_ping(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    bazaar_db::health_check(pool).await?;
    println!("database ok");
    Ok(())
}

/// # Errors
///
/// Returns an error if any migration fails to apply.
pub(crate) async fn run_migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let applied = bazaar_db::run_migrations(pool).await?;
    println!("applied {applied} migration(s)");
    Ok(())
}

/// Validates the seed file and upserts it in one transaction.
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, or any write fails.
pub(crate) async fn run_seed(pool: &sqlx::PgPool, path: &Path) -> anyhow::Result<()> {
    let seed = bazaar_core::load_seed(path)?;
    let summary = bazaar_db::apply_seed(pool, &seed).await?;
    tracing::info!(
        path = %path.display(),
        categories = summary.categories,
        vendors = summary.vendors,
        products = summary.products,
        "seed applied"
    );
    println!(
        "seeded {} categories, {} vendors, {} products",
        summary.categories, summary.vendors, summary.products
    );
    Ok(())
}
