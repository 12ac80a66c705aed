use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub model_base_url: String,
    pub model_api_key: Option<String>,
    pub model_name: String,
    pub model_timeout: Duration,
    pub low_stock_threshold: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let low_stock_threshold: i64 =
            parse_or("LOW_STOCK_THRESHOLD", std::env::var("LOW_STOCK_THRESHOLD").ok(), 15)?;
        if low_stock_threshold < 0 {
            anyhow::bail!("LOW_STOCK_THRESHOLD must not be negative");
        }
        let timeout_secs: u64 =
            parse_or("MODEL_TIMEOUT_SECS", std::env::var("MODEL_TIMEOUT_SECS").ok(), 30)?;
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            model_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            model_api_key: std::env::var("OPENAI_API_KEY").ok(),
            model_name: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            model_timeout: Duration::from_secs(timeout_secs),
            low_stock_threshold,
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", key, e)),
        None => Ok(default),
    }
}
