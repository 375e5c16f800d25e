use db_pool::{create_pool as create_pg_pool, migrate, DbConfig as DbPoolConfig, DbPoolError, PgPool};

pub const SERVICE_NAME: &str = "chat-relay-service";

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init",
    include_str!("../migrations/0001_init.sql"),
)];

/// Connect to Postgres and apply the schema
pub async fn init_pool(database_url: &str) -> Result<PgPool, DbPoolError> {
    let mut cfg = DbPoolConfig::from_env(SERVICE_NAME).unwrap_or_else(|| DbPoolConfig {
        service_name: SERVICE_NAME.to_string(),
        ..DbPoolConfig::default()
    });
    cfg.database_url = database_url.to_string();
    cfg.log_config();

    let pool = create_pg_pool(&cfg).await?;
    migrate(&pool, MIGRATIONS).await?;
    Ok(pool)
}
