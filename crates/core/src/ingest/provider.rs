use crate::config::Settings;
use crate::domain::snapshot::RawOperationalSnapshot;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Supplies a complete snapshot for one client and day. Missing categories are the
/// source's job to default; the pipeline assumes completeness.
#[async_trait::async_trait]
pub trait SnapshotProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_snapshot(&self, client_id: Uuid, date: NaiveDate)
        -> Result<RawOperationalSnapshot>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub snapshot: RawOperationalSnapshot,
}

#[derive(Debug, Clone)]
pub struct HttpJsonSnapshotProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonSnapshotProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.snapshot_provider_timeout_secs))
            .build()
            .context("failed to build snapshot provider http client")?;

        Ok(Self {
            http,
            base_url: settings.require_snapshot_provider_base_url()?.to_string(),
            api_key: settings.snapshot_provider_api_key.clone(),
            path: settings.snapshot_provider_path.clone(),
            retries: settings.snapshot_provider_retries.max(1),
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self, client_id: Uuid, date: NaiveDate) -> Result<SnapshotResponse> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[
                ("client_id", client_id.to_string()),
                ("date", date.to_string()),
            ])
            .send()
            .await
            .context("snapshot provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read snapshot provider response")?;

        if !status.is_success() {
            anyhow::bail!("snapshot provider HTTP {status}: {text}");
        }

        serde_json::from_str::<SnapshotResponse>(&text)
            .with_context(|| format!("snapshot provider response does not match SnapshotResponse: {text}"))
    }
}

fn validate(resp: &SnapshotResponse, client_id: Uuid, expected: NaiveDate) -> Result<()> {
    anyhow::ensure!(
        resp.client_id == client_id,
        "snapshot provider client_id mismatch: expected {client_id}, got {}",
        resp.client_id
    );
    anyhow::ensure!(
        resp.date == expected,
        "snapshot provider date mismatch: expected {expected}, got {}",
        resp.date
    );
    Ok(())
}

#[async_trait::async_trait]
impl SnapshotProvider for HttpJsonSnapshotProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_snapshot(
        &self,
        client_id: Uuid,
        date: NaiveDate,
    ) -> Result<RawOperationalSnapshot> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(client_id, date).await {
                Ok(resp) => {
                    validate(&resp, client_id, date)?;
                    return Ok(resp.snapshot);
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1).min(5));
                    tracing::warn!(attempt, ?backoff, %client_id, error = %err, "snapshot fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(client_id: Uuid, date: NaiveDate) -> serde_json::Value {
        json!({
            "client_id": client_id,
            "date": date,
            "snapshot": {
                "sales": {"salesToday": 0, "orders": 0, "returns": 0},
                "warehouse": {"pickAccuracy": 0, "cph": 0, "mispicks": 0, "overtimeHours": 0, "stuckOrders": 0},
                "staff": {"headcount": 0, "shifts": [], "overtimeRisk": false},
                "support": {"ticketsToday": 0, "autoResolved": 0, "csat": 0, "refundTickets": 0},
                "finance": {"revenue": 0, "refundsAmount": 0, "grossMarginPct": 0}
            }
        })
    }

    fn provider(base_url: &str, path: &str) -> HttpJsonSnapshotProvider {
        HttpJsonSnapshotProvider {
            http: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key: None,
            path: path.to_string(),
            retries: 1,
        }
    }

    #[test]
    fn url_joins_base_and_configured_path() {
        assert_eq!(
            provider("https://ops.example.com/", "v2/snapshot").url(),
            "https://ops.example.com/v2/snapshot"
        );
        assert_eq!(
            provider("https://ops.example.com", "/v1/daily_snapshot").url(),
            "https://ops.example.com/v1/daily_snapshot"
        );
    }

    #[test]
    fn parses_and_validates_expected_shape() {
        let client_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let parsed: SnapshotResponse = serde_json::from_value(response(client_id, date)).unwrap();
        assert!(validate(&parsed, client_id, date).is_ok());
        assert!(parsed.snapshot.staffing.shifts.is_empty());
    }

    #[test]
    fn rejects_other_day_or_client() {
        let client_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let parsed: SnapshotResponse = serde_json::from_value(response(client_id, date)).unwrap();

        let other_day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(validate(&parsed, client_id, other_day).is_err());
        assert!(validate(&parsed, Uuid::new_v4(), date).is_err());
    }
}
