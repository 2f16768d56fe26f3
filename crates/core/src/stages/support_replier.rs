use crate::domain::contract::LlmSupportReply;
use crate::domain::report::{SupportReply, SupportRequest};
use crate::llm::error::GenerationError;
use crate::llm::{GenerationClient, InvokeOptions, StageModels};
use crate::stages::{run_json_stage, serialize_input, StageName};
use serde::Serialize;
use serde_json::{Map, Value};

pub const INPUT_SCHEMA: &str = "clearsight.support_replier.input/v1";

pub const SYSTEM_PROMPT: &str = concat!(
    "You are the AI CUSTOMER SUPPORT AGENT for ClearSight Ops.\n",
    "Goal: draft accurate, polite replies that follow the client's tone and policy.\n",
    "If you are not sure, ask for human review.\n",
    "Return a JSON object with exactly these keys: ",
    "{\"classification\": string, \"urgency\": string, \"reply\": string, \"needsHumanReview\": boolean}.\n",
    "Only output valid JSON. No prose, no markdown formatting.",
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SupportReplierInput<'a> {
    subject: &'a str,
    body: &'a str,
    history: &'a str,
    client_config: &'a Map<String, Value>,
}

pub fn options(models: &StageModels) -> InvokeOptions {
    InvokeOptions::new(models.primary.clone()).strict_json(true)
}

pub async fn draft_support_reply(
    client: &dyn GenerationClient,
    models: &StageModels,
    request: &SupportRequest,
) -> Result<SupportReply, GenerationError> {
    let input = serialize_input(
        INPUT_SCHEMA,
        &SupportReplierInput {
            subject: &request.subject,
            body: &request.body,
            history: request.history.as_deref().unwrap_or(""),
            client_config: &request.client_config,
        },
    );
    run_json_stage::<LlmSupportReply, _, _>(
        client,
        StageName::SupportReplier,
        input,
        &options(models),
        LlmSupportReply::validate_and_into_reply,
    )
    .await
}
