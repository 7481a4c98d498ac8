use serde::Deserialize;

/// Credentials accepted by the super-admin Basic guard.
#[derive(Debug, Clone, Deserialize)]
pub struct SuperAdminConfig {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub super_admin: SuperAdminConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let super_admin = SuperAdminConfig {
            login: std::env::var("SA_LOGIN").unwrap_or_else(|_| "admin".into()),
            password: std::env::var("SA_PASSWORD")?,
        };
        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        Ok(Self {
            database_url,
            db_max_connections,
            super_admin,
        })
    }
}
