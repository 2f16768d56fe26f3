use axum::http::HeaderMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_MAX_REQUESTS: u32 = 60;
const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    /// Upper bound on tracked identifiers.
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = env_u64("RATE_LIMIT_MAX_REQUESTS")? {
            cfg.max_requests = u32::try_from(v.max(1)).unwrap_or(u32::MAX);
        }
        if let Some(v) = env_u64("RATE_LIMIT_WINDOW_SECS")? {
            cfg.window = Duration::from_secs(v.max(1));
        }
        Ok(cfg)
    }
}

fn env_u64(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(s) if !s.trim().is_empty() => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{name} is invalid ({s:?}): {e}")),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request counter keyed by caller identifier.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counts the request and reports whether it is within the limit.
    pub async fn check(&self, identifier: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if !windows.contains_key(identifier) && windows.len() >= self.config.max_entries {
            windows.retain(|_, w| w.reset_at > now);
            if windows.len() >= self.config.max_entries {
                // Still full of live windows: drop the one closest to expiry.
                let oldest = windows
                    .iter()
                    .min_by_key(|(_, w)| w.reset_at)
                    .map(|(k, _)| k.clone());
                if let Some(key) = oldest {
                    windows.remove(&key);
                }
            }
        }

        let window = windows
            .entry(identifier.to_string())
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + self.config.window,
            });
        if now >= window.reset_at {
            *window = Window {
                count: 0,
                reset_at: now + self.config.window,
            };
        }

        window.count = window.count.saturating_add(1);
        window.count <= self.config.max_requests
    }

    /// Drops windows that have expired. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        before - windows.len()
    }

    pub async fn tracked(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// A configured API key when one is presented, otherwise the first forwarded address.
///
/// Unknown keys fall back to the address so rotating junk keys cannot open fresh windows.
pub fn client_identifier(headers: &HeaderMap, api_keys: &[String]) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(key) = header("x-api-key").filter(|k| api_keys.iter().any(|known| known == k)) {
        return format!("key:{key}");
    }
    let ip = header("x-forwarded-for")
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| header("x-real-ip"))
        .unwrap_or("unknown");
    format!("ip:{ip}")
}
