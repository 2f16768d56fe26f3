use crate::domain::contract::{validate_kpis, LlmKpiMetric};
use crate::domain::report::KpiMetric;
use crate::domain::snapshot::RawOperationalSnapshot;
use crate::llm::error::GenerationError;
use crate::llm::{GenerationClient, InvokeOptions, StageModels};
use crate::stages::{run_json_stage, serialize_input, StageName};
use serde::Serialize;

pub const INPUT_SCHEMA: &str = "clearsight.kpi_analyzer.input/v1";

pub const SYSTEM_PROMPT: &str = concat!(
    "You are the KPI ANALYZER for ClearSight Ops.\n",
    "Analyze the operational data and return a JSON array of KPIs.\n",
    "Each KPI must have: key, label, value (number), unit, trend (one of up/down/flat).\n",
    "Optional: target (number).\n",
    "\n",
    "Example output format:\n",
    "[\n",
    "  {\"key\": \"sales\", \"label\": \"Total Sales\", \"value\": 14329, \"unit\": \"$\", \"trend\": \"up\"},\n",
    "  {\"key\": \"orders\", \"label\": \"Orders\", \"value\": 421, \"unit\": \"orders\", \"trend\": \"flat\"}\n",
    "]\n",
    "\n",
    "Return ONLY the JSON array. No prose, no markdown, no code fences, no extra keys.",
);

#[derive(Debug, Serialize)]
struct KpiAnalyzerInput<'a> {
    snapshot: &'a RawOperationalSnapshot,
}

pub fn options(models: &StageModels) -> InvokeOptions {
    InvokeOptions::new(models.fast.clone())
        .temperature(0.3)
        .max_output_tokens(1000)
}

pub async fn analyze_kpis(
    client: &dyn GenerationClient,
    models: &StageModels,
    snapshot: &RawOperationalSnapshot,
) -> Result<Vec<KpiMetric>, GenerationError> {
    let input = serialize_input(INPUT_SCHEMA, &KpiAnalyzerInput { snapshot });
    run_json_stage::<Vec<LlmKpiMetric>, _, _>(
        client,
        StageName::KpiAnalyzer,
        input,
        &options(models),
        validate_kpis,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::Trend;
    use crate::llm::testing::{example_snapshot, models, ScriptedClient};
    use serde_json::Value;

    #[tokio::test]
    async fn parses_fenced_kpi_array() {
        let client = ScriptedClient::new().respond(
            StageName::KpiAnalyzer,
            "```json\n[{\"key\":\"sales\",\"label\":\"Total Sales\",\"value\":14329,\"unit\":\"$\",\"trend\":\"up\"}]\n```",
        );

        let kpis = analyze_kpis(&client, &models(), &example_snapshot()).await.unwrap();
        assert_eq!(kpis.len(), 1);
        assert_eq!(kpis[0].key, "sales");
        assert_eq!(kpis[0].value, 14329.0);
        assert_eq!(kpis[0].trend, Some(Trend::Up));
    }

    #[tokio::test]
    async fn sends_tagged_snapshot_on_fast_model() {
        let client = ScriptedClient::new().respond(StageName::KpiAnalyzer, "[]");
        analyze_kpis(&client, &models(), &example_snapshot()).await.unwrap();

        let call = client.last_call(StageName::KpiAnalyzer).unwrap();
        assert_eq!(call.options.model, "gpt-4o-mini");
        assert_eq!(call.options.max_output_tokens, 1000);
        assert!(!call.options.strict_json_mode);

        let sent: Value = serde_json::from_str(&call.user_content).unwrap();
        assert_eq!(sent["schema"], INPUT_SCHEMA);
        assert_eq!(sent["snapshot"]["sales"]["salesToday"], 14329.0);
    }

    #[tokio::test]
    async fn object_instead_of_array_is_a_parse_error() {
        let client = ScriptedClient::new().respond(
            StageName::KpiAnalyzer,
            "{\"kpis\":[{\"key\":\"sales\",\"label\":\"Sales\",\"value\":1}]}",
        );

        let err = analyze_kpis(&client, &models(), &example_snapshot()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::StageOutputParse { stage: StageName::KpiAnalyzer, .. }
        ));
    }

    #[tokio::test]
    async fn bad_trend_is_a_validation_error() {
        let client = ScriptedClient::new().respond(
            StageName::KpiAnalyzer,
            "[{\"key\":\"sales\",\"label\":\"Sales\",\"value\":1,\"trend\":\"sideways\"}]",
        );

        let err = analyze_kpis(&client, &models(), &example_snapshot()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::StageOutputValidation { stage: StageName::KpiAnalyzer, .. }
        ));
    }
}
