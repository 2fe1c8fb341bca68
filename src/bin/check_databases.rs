//! Utility to verify every module database: connectivity, schema bootstrap
//! and a read of the `contribuinte` table.

use contribuinte_api::config::{redact_database_url, Config};
use contribuinte_api::db::{ensure_schema, ping, Database};
use contribuinte_api::module_router::Module;

async fn check_module(config: &Config, module: Module) -> anyhow::Result<i64> {
    let db = Database::new(config.url_for(module), 1).await?;
    ping(&db.pool).await?;
    ensure_schema(&db.pool).await?;

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contribuinte")
        .fetch_one(&db.pool)
        .await?;
    Ok(count)
}

/// Main entry point for the database check utility.
///
/// Exits non-zero when any module database fails a check.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    println!("Checking module databases");
    for (first, second) in config.shared_database_targets() {
        println!(
            "! Modules {} and {} share one database; their records are not isolated",
            first, second
        );
    }
    let mut failed = 0;

    for module in Module::ALL {
        let target = redact_database_url(config.url_for(module));
        match check_module(&config, module).await {
            Ok(count) => println!("✓ Module {} ({}): {} records", module, target, count),
            Err(e) => {
                failed += 1;
                println!("✗ Module {} ({}): {}", module, target, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} module database(s) failed the check", failed);
    }

    println!("All module databases are reachable");
    Ok(())
}
