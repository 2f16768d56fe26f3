use crate::domain::contract::{validate_actions, LlmRecommendedAction};
use crate::domain::report::{DetectedIssue, KpiMetric, RecommendedAction};
use crate::llm::error::GenerationError;
use crate::llm::{GenerationClient, InvokeOptions, StageModels};
use crate::stages::{run_json_stage, serialize_input, StageName};
use serde::Serialize;

pub const INPUT_SCHEMA: &str = "clearsight.strategist.input/v1";

pub const SYSTEM_PROMPT: &str = concat!(
    "You are the AI STRATEGIST for ClearSight Ops.\n",
    "Propose the top 3-7 operations actions for today based on the KPIs and issues.\n",
    "Return a JSON array of {title, description, impactScore, confidence}.\n",
    "impactScore is a number from 1 to 10. confidence is a percentage from 0 to 100.\n",
    "Only output a valid JSON array. No prose, no markdown formatting.",
);

#[derive(Debug, Serialize)]
struct StrategistInput<'a> {
    kpis: &'a [KpiMetric],
    issues: &'a [DetectedIssue],
}

pub fn options(models: &StageModels) -> InvokeOptions {
    InvokeOptions::new(models.primary.clone())
}

pub async fn generate_actions(
    client: &dyn GenerationClient,
    models: &StageModels,
    kpis: &[KpiMetric],
    issues: &[DetectedIssue],
) -> Result<Vec<RecommendedAction>, GenerationError> {
    let input = serialize_input(INPUT_SCHEMA, &StrategistInput { kpis, issues });
    run_json_stage::<Vec<LlmRecommendedAction>, _, _>(
        client,
        StageName::Strategist,
        input,
        &options(models),
        validate_actions,
    )
    .await
}
