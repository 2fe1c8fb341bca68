//! Request-time selection of the physical database.
//!
//! Every `/contribuinte` request carries an optional `module` query parameter.
//! The tag is resolved to a [`Module`] by a total, case-insensitive mapping
//! and the module picks one of the three pools held in [`Databases`].

use serde::Deserialize;
use sqlx::PgPool;
use std::fmt;

use crate::config::Config;
use crate::db::Database;
use crate::repository::ContribuinteRepository;

/// A logical partition bound to its own database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    A,
    B,
    Legacy,
}

impl Module {
    /// Module used when the request names none, or names one we don't know.
    pub const DEFAULT: Module = Module::A;

    pub const ALL: [Module; 3] = [Module::A, Module::B, Module::Legacy];

    /// Resolves a request-supplied tag. Never fails.
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(tag) = tag else {
            return Self::DEFAULT;
        };

        match tag.trim().to_ascii_uppercase().as_str() {
            "A" => Module::A,
            "B" => Module::B,
            "LEGACY" => Module::Legacy,
            other => {
                if !other.is_empty() {
                    tracing::debug!(
                        "Unknown module tag '{}', using module {}",
                        tag,
                        Self::DEFAULT
                    );
                }
                Self::DEFAULT
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::A => "A",
            Module::B => "B",
            Module::Legacy => "legacy",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `module` query parameter shared by every routed endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ModuleQuery {
    pub module: Option<String>,
}

impl ModuleQuery {
    pub fn module(&self) -> Module {
        Module::from_tag(self.module.as_deref())
    }
}

/// The three independent pools, fixed at process start.
#[derive(Clone)]
pub struct Databases {
    a: PgPool,
    b: PgPool,
    legacy: PgPool,
}

impl Databases {
    pub fn new(a: PgPool, b: PgPool, legacy: PgPool) -> Self {
        Self { a, b, legacy }
    }

    /// Lazily connected pools for every configured database.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            a: Database::lazy(config.url_for(Module::A), config.max_connections)?.pool,
            b: Database::lazy(config.url_for(Module::B), config.max_connections)?.pool,
            legacy: Database::lazy(config.url_for(Module::Legacy), config.max_connections)?.pool,
        })
    }

    pub fn pool(&self, module: Module) -> &PgPool {
        match module {
            Module::A => &self.a,
            Module::B => &self.b,
            Module::Legacy => &self.legacy,
        }
    }

    pub fn repository(&self, module: Module) -> ContribuinteRepository {
        ContribuinteRepository::new(self.pool(module).clone())
    }
}
