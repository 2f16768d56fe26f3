pub mod domain;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod stages;
pub mod storage;
pub mod time;

pub mod config {
    use crate::llm::Provider;
    use anyhow::Context;

    const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
    const DEFAULT_RATE_LIMIT_BACKOFF_MS: u64 = 2000;
    const DEFAULT_SNAPSHOT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_SNAPSHOT_RETRIES: u32 = 3;
    const DEFAULT_SNAPSHOT_PATH: &str = "/v1/daily_snapshot";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub llm_provider: Provider,
        pub openai_api_key: Option<String>,
        pub openai_base_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub anthropic_base_url: Option<String>,
        pub llm_primary_model: Option<String>,
        pub llm_fast_model: Option<String>,
        pub llm_timeout_secs: u64,
        pub llm_rate_limit_backoff_ms: u64,
        pub sentry_dsn: Option<String>,
        pub snapshot_provider_base_url: Option<String>,
        pub snapshot_provider_api_key: Option<String>,
        pub snapshot_provider_timeout_secs: u64,
        /// Total attempts per fetch, never below one.
        pub snapshot_provider_retries: u32,
        pub snapshot_provider_path: String,
        pub demo_mode: bool,
        /// Empty means the API does not check `x-api-key`.
        pub api_keys: Vec<String>,
        pub report_tz_offset_hours: i32,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let llm_provider = match non_empty_var("LLM_PROVIDER") {
                Some(s) => Provider::parse(&s)
                    .with_context(|| format!("LLM_PROVIDER must be openai or anthropic (got {s:?})"))?,
                None => Provider::OpenAI,
            };

            let report_tz_offset_hours = parse_var::<i32>("REPORT_TZ_OFFSET_HOURS")?.unwrap_or(0);
            anyhow::ensure!(
                (-12..=14).contains(&report_tz_offset_hours),
                "REPORT_TZ_OFFSET_HOURS must be between -12 and 14 (got {report_tz_offset_hours})"
            );

            let snapshot_provider_timeout_secs = at_least_one(
                "SNAPSHOT_PROVIDER_TIMEOUT_SECS",
                parse_var("SNAPSHOT_PROVIDER_TIMEOUT_SECS")?,
                DEFAULT_SNAPSHOT_TIMEOUT_SECS,
            )?;
            let snapshot_provider_retries = at_least_one(
                "SNAPSHOT_PROVIDER_RETRIES",
                parse_var("SNAPSHOT_PROVIDER_RETRIES")?,
                DEFAULT_SNAPSHOT_RETRIES,
            )?;

            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                llm_provider,
                openai_api_key: non_empty_var("OPENAI_API_KEY"),
                openai_base_url: non_empty_var("OPENAI_BASE_URL"),
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                anthropic_base_url: non_empty_var("ANTHROPIC_BASE_URL"),
                llm_primary_model: non_empty_var("LLM_PRIMARY_MODEL"),
                llm_fast_model: non_empty_var("LLM_FAST_MODEL"),
                llm_timeout_secs: parse_var("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
                llm_rate_limit_backoff_ms: parse_var("LLM_RATE_LIMIT_BACKOFF_MS")?
                    .unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF_MS),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                snapshot_provider_base_url: non_empty_var("SNAPSHOT_PROVIDER_BASE_URL"),
                snapshot_provider_api_key: non_empty_var("SNAPSHOT_PROVIDER_API_KEY"),
                snapshot_provider_timeout_secs,
                snapshot_provider_retries,
                snapshot_provider_path: non_empty_var("SNAPSHOT_PROVIDER_PATH")
                    .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string()),
                demo_mode: non_empty_var("CLEARSIGHT_DEMO_MODE").as_deref() == Some("true"),
                api_keys: non_empty_var("API_KEYS")
                    .map(|s| split_list(&s))
                    .unwrap_or_default(),
                report_tz_offset_hours,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_snapshot_provider_base_url(&self) -> anyhow::Result<&str> {
            self.snapshot_provider_base_url
                .as_deref()
                .context("SNAPSHOT_PROVIDER_BASE_URL is required")
        }
    }

    fn non_empty_var(name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn parse_var<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match non_empty_var(name) {
            None => Ok(None),
            Some(s) => s
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("{name} is invalid ({s:?}): {e}")),
        }
    }

    fn at_least_one<T>(name: &str, value: Option<T>, default: T) -> anyhow::Result<T>
    where
        T: PartialOrd + From<u8> + std::fmt::Display,
    {
        let value = value.unwrap_or(default);
        anyhow::ensure!(value >= T::from(1), "{name} must be at least 1 (got {value})");
        Ok(value)
    }

    pub(crate) fn split_list(s: &str) -> Vec<String> {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

}
