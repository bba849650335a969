//! SQLite persistence for strategy settings and variables.
//!
//! Stores what a strategy host needs to rebuild its instances after restart:
//! - Strategy settings (class, symbol, parameter overrides)
//! - Strategy variables (position and strategy-declared state)

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, info};

use crate::config::StrategyConfig;
use crate::strategy::{Setting, StrategyData};

/// Variables that only describe the running process and are never stored.
const RUNTIME_VARIABLES: [&str; 2] = ["inited", "trading"];

/// Strategy settings and data store.
#[derive(Clone)]
pub struct StrategyStore {
    pool: SqlitePool,
}

/// Stored strategy setting row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredSetting {
    pub strategy_name: String,
    pub class_name: String,
    pub vt_symbol: String,
    pub setting: String,
    pub updated_at: String,
}

impl StoredSetting {
    pub fn into_config(self) -> Result<StrategyConfig> {
        let setting: Setting = serde_json::from_str(&self.setting)
            .with_context(|| format!("Corrupt setting for strategy {}", self.strategy_name))?;

        Ok(StrategyConfig {
            strategy_name: self.strategy_name,
            class_name: self.class_name,
            vt_symbol: self.vt_symbol,
            setting,
        })
    }
}

impl StrategyStore {
    /// Connect and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        Self::with_pool(pool).await
    }

    /// Private in-memory store. A single connection keeps every query on the
    /// same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_setting (
                strategy_name TEXT PRIMARY KEY,
                class_name TEXT NOT NULL,
                vt_symbol TEXT NOT NULL,
                setting TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_data (
                strategy_name TEXT PRIMARY KEY,
                data TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Database migrations complete");
        Ok(())
    }

    // ==================== Settings ====================

    /// Insert or replace the setting of a strategy.
    pub async fn save_setting(&self, config: &StrategyConfig) -> Result<()> {
        let setting = serde_json::to_string(&config.setting)?;

        sqlx::query(
            r#"
            INSERT INTO strategy_setting (strategy_name, class_name, vt_symbol, setting, updated_at)
            VALUES (?, ?, ?, ?, datetime('now'))
            ON CONFLICT(strategy_name) DO UPDATE SET
                class_name = excluded.class_name,
                vt_symbol = excluded.vt_symbol,
                setting = excluded.setting,
                updated_at = datetime('now')
            "#,
        )
        .bind(&config.strategy_name)
        .bind(&config.class_name)
        .bind(&config.vt_symbol)
        .bind(setting)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save setting for {}", config.strategy_name))?;

        info!(strategy = %config.strategy_name, class = %config.class_name, "Setting saved");
        Ok(())
    }

    /// All stored settings, ordered by strategy name.
    pub async fn load_settings(&self) -> Result<Vec<StrategyConfig>> {
        let rows = sqlx::query_as::<_, StoredSetting>(
            "SELECT strategy_name, class_name, vt_symbol, setting, updated_at FROM strategy_setting ORDER BY strategy_name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredSetting::into_config).collect()
    }

    /// Remove a strategy's setting and data. Returns whether a setting existed.
    pub async fn remove_setting(&self, strategy_name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM strategy_setting WHERE strategy_name = ?")
            .bind(strategy_name)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM strategy_data WHERE strategy_name = ?")
            .bind(strategy_name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== Data ====================

    /// Persist a snapshot's variables, minus the runtime-only flags.
    pub async fn save_data(&self, data: &StrategyData) -> Result<()> {
        let variables: Setting = data
            .variables
            .iter()
            .filter(|(name, _)| !RUNTIME_VARIABLES.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let json = serde_json::to_string(&variables)?;

        sqlx::query(
            r#"
            INSERT INTO strategy_data (strategy_name, data, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(strategy_name) DO UPDATE SET
                data = excluded.data,
                updated_at = datetime('now')
            "#,
        )
        .bind(&data.strategy_name)
        .bind(json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save data for {}", data.strategy_name))?;

        debug!(strategy = %data.strategy_name, "Strategy data synced");
        Ok(())
    }

    /// Stored variables of a strategy, if any.
    pub async fn load_data(&self, strategy_name: &str) -> Result<Option<Setting>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM strategy_data WHERE strategy_name = ?")
                .bind(strategy_name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data,)| {
            serde_json::from_str(&data)
                .with_context(|| format!("Corrupt data for strategy {}", strategy_name))
        })
        .transpose()
    }
}
