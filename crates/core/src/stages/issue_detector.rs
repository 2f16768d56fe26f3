use crate::domain::contract::{validate_issues, LlmDetectedIssue};
use crate::domain::report::{DetectedIssue, KpiMetric};
use crate::domain::snapshot::RawOperationalSnapshot;
use crate::llm::error::GenerationError;
use crate::llm::{GenerationClient, InvokeOptions, StageModels};
use crate::stages::{run_json_stage, serialize_input, StageName};
use serde::Serialize;

pub const INPUT_SCHEMA: &str = "clearsight.issue_detector.input/v1";

pub const SYSTEM_PROMPT: &str = concat!(
    "You are the ISSUE DETECTOR for ClearSight Ops.\n",
    "Find any operational abnormalities in the raw data and the analyzed KPIs.\n",
    "Output a JSON array of {severity, title, description, meta}.\n",
    "severity is one of low, medium, high, critical. meta is an optional object.\n",
    "If nothing is abnormal, output [].\n",
    "Only output a valid JSON array. No prose, no markdown formatting.",
);

#[derive(Debug, Serialize)]
struct IssueDetectorInput<'a> {
    raw: &'a RawOperationalSnapshot,
    kpis: &'a [KpiMetric],
}

pub fn options(models: &StageModels) -> InvokeOptions {
    InvokeOptions::new(models.primary.clone())
}

pub async fn detect_issues(
    client: &dyn GenerationClient,
    models: &StageModels,
    raw: &RawOperationalSnapshot,
    kpis: &[KpiMetric],
) -> Result<Vec<DetectedIssue>, GenerationError> {
    let input = serialize_input(INPUT_SCHEMA, &IssueDetectorInput { raw, kpis });
    run_json_stage::<Vec<LlmDetectedIssue>, _, _>(
        client,
        StageName::IssueDetector,
        input,
        &options(models),
        validate_issues,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::Severity;
    use crate::llm::testing::{example_snapshot, models, ScriptedClient};
    use serde_json::Value;

    fn kpis() -> Vec<KpiMetric> {
        vec![KpiMetric {
            key: "stuck_orders".to_string(),
            label: "Stuck Orders".to_string(),
            value: 1.0,
            unit: None,
            trend: None,
            target: Some(0.0),
        }]
    }

    #[tokio::test]
    async fn embeds_snapshot_and_kpis() {
        let client = ScriptedClient::new().respond(StageName::IssueDetector, "[]");
        let issues = detect_issues(&client, &models(), &example_snapshot(), &kpis())
            .await
            .unwrap();
        assert!(issues.is_empty());

        let call = client.last_call(StageName::IssueDetector).unwrap();
        let sent: Value = serde_json::from_str(&call.user_content).unwrap();
        assert_eq!(sent["schema"], INPUT_SCHEMA);
        assert_eq!(sent["raw"]["warehouse"]["stuckOrders"], 1);
        assert_eq!(sent["kpis"][0]["key"], "stuck_orders");
        assert_eq!(call.options.model, "gpt-4o");
    }

    #[tokio::test]
    async fn keeps_model_order() {
        let client = ScriptedClient::new().respond(
            StageName::IssueDetector,
            r#"[
                {"severity":"low","title":"Minor mispicks","description":"3 mispicks"},
                {"severity":"critical","title":"Refund spike","description":"9 refund tickets","meta":{"refundTickets":9}}
            ]"#,
        );
        let issues = detect_issues(&client, &models(), &example_snapshot(), &kpis())
            .await
            .unwrap();

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Low);
        assert_eq!(issues[1].severity, Severity::Critical);
        assert_eq!(issues[1].metadata.get("refundTickets"), Some(&Value::from(9)));
    }

    #[tokio::test]
    async fn unknown_severity_is_rejected() {
        let client = ScriptedClient::new().respond(
            StageName::IssueDetector,
            r#"[{"severity":"urgent","title":"x","description":"y"}]"#,
        );
        let err = detect_issues(&client, &models(), &example_snapshot(), &kpis())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(StageName::IssueDetector));
        assert_eq!(err.kind(), "stage_output_validation");
    }
}
