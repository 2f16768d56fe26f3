//! Shapes the generation service is asked to emit, and the business-rule checks that turn
//! them into domain records.
//!
//! Deserializing into these types is the structural check (a failure there is a parse error).
//! `validate_*` is the second step: well-formed JSON that breaks a documented range or enum.

use crate::domain::report::{
    DetectedIssue, KpiMetric, OutreachDraft, RecommendedAction, Severity, SupportReply, Trend,
};
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const IMPACT_SCORE_RANGE: std::ops::RangeInclusive<f64> = 1.0..=10.0;
pub const CONFIDENCE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmKpiMetric {
    pub key: String,
    pub label: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmDetectedIssue {
    #[serde(default)]
    pub id: Option<String>,
    pub severity: String,
    pub title: String,
    pub description: String,
    #[serde(default, alias = "metadata")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LlmRecommendedAction {
    pub title: String,
    pub description: String,
    pub impact_score: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LlmSupportReply {
    pub classification: String,
    pub urgency: String,
    pub reply: String,
    pub needs_human_review: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmOutreachDraft {
    pub subject: String,
    pub body: String,
}

impl LlmKpiMetric {
    pub fn validate_and_into_metric(self) -> anyhow::Result<KpiMetric> {
        let key = self.key.trim().to_string();
        ensure!(!key.is_empty(), "kpi key must be non-empty");

        let label = self.label.trim().to_string();
        ensure!(!label.is_empty(), "kpi label must be non-empty (key={key})");

        let trend = match self.trend.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => Some(
                Trend::parse(raw)
                    .with_context(|| format!("kpi trend must be up/down/flat (key={key}, got {raw:?})"))?,
            ),
        };

        let unit = self
            .unit
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(KpiMetric {
            key,
            label,
            value: self.value,
            unit,
            trend,
            target: self.target,
        })
    }
}

impl LlmDetectedIssue {
    pub fn validate_and_into_issue(self) -> anyhow::Result<DetectedIssue> {
        let title = self.title.trim().to_string();
        ensure!(!title.is_empty(), "issue title must be non-empty");

        let severity = Severity::parse(&self.severity).with_context(|| {
            format!(
                "issue severity must be low/medium/high/critical (title={title}, got {:?})",
                self.severity
            )
        })?;

        let mut metadata = self.meta.unwrap_or_default();
        if let Some(id) = self.id.filter(|s| !s.trim().is_empty()) {
            metadata.entry("id").or_insert(Value::String(id));
        }

        Ok(DetectedIssue {
            severity,
            title,
            description: self.description.trim().to_string(),
            metadata,
        })
    }
}

impl LlmRecommendedAction {
    pub fn validate_and_into_action(self) -> anyhow::Result<RecommendedAction> {
        let title = self.title.trim().to_string();
        ensure!(!title.is_empty(), "action title must be non-empty");

        ensure!(
            IMPACT_SCORE_RANGE.contains(&self.impact_score),
            "impactScore must be between 1 and 10 (title={title}, got {})",
            self.impact_score
        );
        ensure!(
            CONFIDENCE_RANGE.contains(&self.confidence),
            "confidence must be between 0 and 100 (title={title}, got {})",
            self.confidence
        );

        Ok(RecommendedAction {
            title,
            description: self.description.trim().to_string(),
            impact_score: self.impact_score,
            confidence: self.confidence,
        })
    }
}

impl LlmSupportReply {
    pub fn validate_and_into_reply(self) -> anyhow::Result<SupportReply> {
        let classification = self.classification.trim().to_string();
        ensure!(!classification.is_empty(), "classification must be non-empty");

        let reply = self.reply.trim().to_string();
        ensure!(!reply.is_empty(), "reply must be non-empty");

        Ok(SupportReply {
            classification,
            urgency: self.urgency.trim().to_string(),
            reply,
            needs_human_review: self.needs_human_review,
        })
    }
}

impl LlmOutreachDraft {
    pub fn validate_and_into_draft(self) -> anyhow::Result<OutreachDraft> {
        let subject = self.subject.trim().to_string();
        ensure!(!subject.is_empty(), "subject must be non-empty");

        let body = self.body.trim().to_string();
        ensure!(!body.is_empty(), "body must be non-empty");

        Ok(OutreachDraft { subject, body })
    }
}

pub fn validate_kpis(items: Vec<LlmKpiMetric>) -> anyhow::Result<Vec<KpiMetric>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let metric = item
            .validate_and_into_metric()
            .with_context(|| format!("kpi[{idx}]"))?;
        if !seen.insert(metric.key.clone()) {
            // Left in place; downstream consumers decide how to merge.
            tracing::warn!(key = %metric.key, "duplicate kpi key in model output");
        }
        out.push(metric);
    }
    Ok(out)
}

pub fn validate_issues(items: Vec<LlmDetectedIssue>) -> anyhow::Result<Vec<DetectedIssue>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let issue = item
            .validate_and_into_issue()
            .with_context(|| format!("issue[{idx}]"))?;
        if !seen.insert(issue.title.clone()) {
            tracing::warn!(title = %issue.title, "duplicate issue title in model output");
        }
        out.push(issue);
    }
    Ok(out)
}

pub fn validate_actions(items: Vec<LlmRecommendedAction>) -> anyhow::Result<Vec<RecommendedAction>> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            item.validate_and_into_action()
                .with_context(|| format!("action[{idx}]"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kpi(v: Value) -> anyhow::Result<KpiMetric> {
        serde_json::from_value::<LlmKpiMetric>(v)?.validate_and_into_metric()
    }

    #[test]
    fn kpi_trend_is_normalized() {
        let m = kpi(json!({"key": "sales", "label": "Sales", "value": 1.5, "trend": "DOWN"})).unwrap();
        assert_eq!(m.trend, Some(Trend::Down));
        assert_eq!(m.unit, None);
    }

    #[test]
    fn kpi_rejects_unknown_trend() {
        let err = kpi(json!({"key": "sales", "label": "Sales", "value": 1.5, "trend": "sideways"}))
            .unwrap_err();
        assert!(format!("{err:#}").contains("sideways"));
    }

    #[test]
    fn kpi_rejects_unknown_keys_structurally() {
        let res = serde_json::from_value::<LlmKpiMetric>(
            json!({"key": "sales", "label": "Sales", "value": 1.0, "comment": "x"}),
        );
        assert!(res.is_err());
    }

    #[test]
    fn kpi_rejects_string_value_structurally() {
        let res = serde_json::from_value::<LlmKpiMetric>(
            json!({"key": "sales", "label": "Sales", "value": "14329"}),
        );
        assert!(res.is_err());
    }

    #[test]
    fn issue_accepts_metadata_alias_and_keeps_id() {
        let issue = serde_json::from_value::<LlmDetectedIssue>(json!({
            "id": "iss-1",
            "severity": "High",
            "title": "Stuck orders",
            "description": "3 orders stuck",
            "metadata": {"count": 3}
        }))
        .unwrap()
        .validate_and_into_issue()
        .unwrap();

        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.metadata.get("count"), Some(&json!(3)));
        assert_eq!(issue.metadata.get("id"), Some(&json!("iss-1")));
    }

    #[test]
    fn action_ranges_are_enforced() {
        let ok = serde_json::from_value::<LlmRecommendedAction>(json!({
            "title": "Cross-train pickers", "description": "d", "impactScore": 10, "confidence": 0
        }))
        .unwrap();
        assert!(ok.validate_and_into_action().is_ok());

        let bad_impact = serde_json::from_value::<LlmRecommendedAction>(json!({
            "title": "t", "description": "d", "impactScore": 11, "confidence": 50
        }))
        .unwrap();
        assert!(bad_impact.validate_and_into_action().is_err());

        let bad_confidence = serde_json::from_value::<LlmRecommendedAction>(json!({
            "title": "t", "description": "d", "impactScore": 5, "confidence": 0.85e3
        }))
        .unwrap();
        assert!(bad_confidence.validate_and_into_action().is_err());
    }

    #[test]
    fn duplicate_kpi_keys_are_kept() {
        let items = vec![
            serde_json::from_value(json!({"key": "sales", "label": "Sales", "value": 1})).unwrap(),
            serde_json::from_value(json!({"key": "sales", "label": "Sales", "value": 2})).unwrap(),
        ];
        let kpis = validate_kpis(items).unwrap();
        assert_eq!(kpis.len(), 2);
    }

    #[test]
    fn support_reply_requires_exact_keys() {
        let extra = serde_json::from_value::<LlmSupportReply>(json!({
            "classification": "refund", "urgency": "high", "reply": "Hi", "needsHumanReview": false, "tone": "warm"
        }));
        assert!(extra.is_err());

        let missing = serde_json::from_value::<LlmSupportReply>(json!({
            "classification": "refund", "urgency": "high", "reply": "Hi"
        }));
        assert!(missing.is_err());
    }

    #[test]
    fn outreach_rejects_blank_body() {
        let draft = serde_json::from_value::<LlmOutreachDraft>(json!({"subject": "Hello", "body": "  "}))
            .unwrap();
        assert!(draft.validate_and_into_draft().is_err());
    }
}
