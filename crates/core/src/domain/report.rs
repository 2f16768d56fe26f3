use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    /// Case-insensitive match against the three accepted spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "flat" => Some(Self::Flat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiMetric {
    pub key: String,
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical issues are the ones worth surfacing outside a full report.
    pub fn is_urgent(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedIssue {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default, rename = "meta", skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedAction {
    pub title: String,
    pub description: String,
    /// 1..=10
    pub impact_score: f64,
    /// 0..=100
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReportPayload {
    pub date: NaiveDate,
    pub kpis: Vec<KpiMetric>,
    pub issues: Vec<DetectedIssue>,
    pub actions: Vec<RecommendedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<String>,
}

/// Narrative text written by the report composer. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComposedReport(String);

impl ComposedReport {
    pub(crate) fn new(text: String) -> Self {
        debug_assert!(!text.trim().is_empty());
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ComposedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub payload: DailyReportPayload,
    pub narrative: ComposedReport,
}

impl DailyReport {
    pub fn subject(&self) -> String {
        format!("Daily Ops Report – {}", self.payload.date)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueScan {
    pub kpis: Vec<KpiMetric>,
    pub issues: Vec<DetectedIssue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportRequest {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub history: Option<String>,
    /// Client tone and policy settings, passed through to the model untouched.
    #[serde(default)]
    pub client_config: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportReply {
    pub classification: String,
    pub urgency: String,
    pub reply: String,
    pub needs_human_review: bool,
}

/// A sales lead. Only `name`/`company` are looked at directly; every other field rides along.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Lead {
    pub fn display_name(&self) -> &str {
        self.company
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("unknown lead")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachDraft {
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trend_and_severity_parse_case_insensitively() {
        assert_eq!(Trend::parse(" Up "), Some(Trend::Up));
        assert_eq!(Trend::parse("rising"), None);
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("severe"), None);
    }

    #[test]
    fn only_high_and_critical_are_urgent() {
        assert!(!Severity::Low.is_urgent());
        assert!(!Severity::Medium.is_urgent());
        assert!(Severity::High.is_urgent());
        assert!(Severity::Critical.is_urgent());
    }

    #[test]
    fn payload_serializes_with_wire_field_names() {
        let payload = DailyReportPayload {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            kpis: vec![],
            issues: vec![],
            actions: vec![RecommendedAction {
                title: "t".to_string(),
                description: "d".to_string(),
                impact_score: 7.0,
                confidence: 80.0,
            }],
            forecast: None,
        };

        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["date"], json!("2026-03-02"));
        assert_eq!(v["actions"][0]["impactScore"], json!(7.0));
        assert!(v.get("forecast").is_none());
    }

    #[test]
    fn lead_keeps_unknown_fields() {
        let lead: Lead = serde_json::from_value(json!({
            "name": "Dana",
            "company": "Acme Logistics",
            "role": "VP Ops"
        }))
        .unwrap();
        assert_eq!(lead.display_name(), "Acme Logistics");
        assert_eq!(lead.extra.get("role"), Some(&json!("VP Ops")));
    }
}
