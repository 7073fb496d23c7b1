use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use catalog_service::metrics::ServiceMetrics;
use catalog_service::tokens::TokenSigner;
use catalog_service::AppState;
use common_auth::{AuthContext, JwtConfig, TokenVerifier};
use dirs::cache_dir;
use pg_embed::pg_enums::PgAuthMethod;
use pg_embed::pg_fetch::{PgFetchSettings, PG_V13};
use pg_embed::postgres::{PgEmbed, PgSettings};
use portpicker::pick_unused_port;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

pub const TEST_TOKEN_SECRET: &str = "catalog-test-secret";

pub struct TestDatabase {
    pool: PgPool,
    embedded: Option<EmbeddedPg>,
}

impl TestDatabase {
    pub async fn setup() -> Result<Option<Self>> {
        if env::var("CATALOG_TEST_DATABASE_URL").is_err()
            && !env_flag_enabled("CATALOG_TEST_USE_EMBED")
        {
            eprintln!(
                "Skipping catalog-service integration tests: set CATALOG_TEST_DATABASE_URL or CATALOG_TEST_USE_EMBED=1 to run them.",
            );
            return Ok(None);
        }

        let mut embedded = None;
        let database_url = if let Ok(url) = env::var("CATALOG_TEST_DATABASE_URL") {
            url
        } else {
            if env_flag_enabled("CATALOG_TEST_EMBED_CLEAR_CACHE") {
                if let Some(cache_dir) = cache_dir() {
                    let _ = std::fs::remove_dir_all(cache_dir.join("pg-embed"));
                }
            }

            let temp = tempdir()?;
            let port = pick_unused_port()
                .context("failed to find available port for embedded Postgres")?;

            let mut fetch_settings = PgFetchSettings::default();
            fetch_settings.version = PG_V13;

            let mut pg = PgEmbed::new(
                PgSettings {
                    database_dir: temp.path().to_path_buf(),
                    port,
                    user: "postgres".to_string(),
                    password: "postgres".to_string(),
                    auth_method: PgAuthMethod::Plain,
                    persistent: false,
                    timeout: Some(Duration::from_secs(30)),
                    migration_dir: None,
                },
                fetch_settings,
            )
            .await?;

            pg.setup().await?;
            pg.start_db().await?;

            let uri = format!("{}/postgres", pg.db_uri);
            embedded = Some(EmbeddedPg {
                pg,
                _temp_dir: temp,
            });
            uri
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        if embedded.is_some() || env_flag_enabled("CATALOG_TEST_APPLY_MIGRATIONS") {
            run_migrations(&pool).await?;
        }

        Ok(Some(Self { pool, embedded }))
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn teardown(self) -> Result<()> {
        if let Some(embedded) = self.embedded {
            embedded.shutdown().await;
        }
        Ok(())
    }
}

struct EmbeddedPg {
    pg: PgEmbed,
    _temp_dir: TempDir,
}

impl EmbeddedPg {
    async fn shutdown(mut self) {
        let _ = self.pg.stop_db().await;
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let mut entries = std::fs::read_dir(&migrations_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        let sql = std::fs::read_to_string(&path)?;
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    Ok(())
}

#[allow(dead_code)]
pub fn test_state(pool: PgPool) -> Result<AppState> {
    Ok(AppState {
        db: pool,
        verifier: Arc::new(TokenVerifier::new(JwtConfig::new(TEST_TOKEN_SECRET))),
        signer: Arc::new(TokenSigner::new(TEST_TOKEN_SECRET)),
        metrics: Arc::new(ServiceMetrics::new()?),
    })
}

/// Build an authenticated request context the way the extractor would,
/// by verifying the real token against the state's verifier.
#[allow(dead_code)]
pub fn auth_context(state: &AppState, token: &str) -> Result<AuthContext> {
    let claims = state.verifier.verify(token)?;
    Ok(AuthContext {
        claims,
        token: token.to_string(),
    })
}

/// Usernames are globally unique, so each test mints its own.
#[allow(dead_code)]
pub fn unique_username(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// A fresh tenancy key, distinct from every other test's groups.
#[allow(dead_code)]
pub fn unique_group_id() -> i64 {
    (Uuid::new_v4().as_u128() % 1_000_000_000_000) as i64
}

fn env_flag_enabled(key: &str) -> bool {
    matches!(env::var(key), Ok(value) if is_truthy(value.as_str()))
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}
