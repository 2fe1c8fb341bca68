use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::redact_database_url;

/// DDL for the single table every module database carries.
///
/// The unique constraints are the authoritative duplicate guard; the
/// repository's pre-checks only turn the common case into a clearer message.
pub const CONTRIBUINTE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contribuinte (
    ref_id        SERIAL PRIMARY KEY,
    dat_proce     DATE         NOT NULL,
    cpf_cnpj      VARCHAR(14)  NOT NULL,
    cliente       VARCHAR(80)  NOT NULL,
    email         VARCHAR(255),
    dat_cadastro  DATE,
    CONSTRAINT contribuinte_cpf_cnpj_key UNIQUE (cpf_cnpj),
    CONSTRAINT contribuinte_email_key UNIQUE (email)
)
"#;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connects eagerly and verifies the connection.
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        ping(&pool).await?;

        Ok(Self { pool })
    }

    /// Builds the pool without opening a connection.
    ///
    /// Connections are established on first use, so an unreachable server
    /// only fails the requests routed to it.
    pub fn lazy(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(database_url)
            .map_err(|e| {
                anyhow::anyhow!(
                    "Invalid database URL {}: {}",
                    redact_database_url(database_url),
                    e
                )
            })?;

        Ok(Self { pool })
    }
}

pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Creates the `contribuinte` table if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CONTRIBUINTE_SCHEMA).execute(pool).await?;
    Ok(())
}
