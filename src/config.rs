use anyhow::Context;

/// Settings read from the environment. The date mode is read by clap from
/// `DISTRICT_REPORTS_DATE_MODE`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_json: bool,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match lookup("DISTRICT_REPORTS_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid DISTRICT_REPORTS_MAX_CONNECTIONS '{raw}'"))?,
            None => 5,
        };

        Ok(Settings {
            database_url,
            max_connections: max_connections.max(1),
            log_json: lookup("DISTRICT_REPORTS_LOG_JSON")
                .map(|raw| env_flag(&raw))
                .unwrap_or(false),
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }
}

pub fn env_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
