use crate::domain::contract::LlmOutreachDraft;
use crate::domain::report::{Lead, OutreachDraft};
use crate::llm::error::GenerationError;
use crate::llm::{GenerationClient, InvokeOptions, StageModels};
use crate::stages::{run_json_stage, serialize_input, StageName};
use serde::Serialize;

pub const INPUT_SCHEMA: &str = "clearsight.outreach_personalizer.input/v1";

pub const SYSTEM_PROMPT: &str = concat!(
    "You are the AI SALES SDR AGENT for ClearSight Ops.\n",
    "Personalize cold emails to operations leaders using the lead details and the template.\n",
    "Return a JSON object with exactly these keys: {\"subject\": string, \"body\": string}.\n",
    "Only output valid JSON. No prose, no markdown formatting.",
);

#[derive(Debug, Serialize)]
struct OutreachInput<'a> {
    lead: &'a Lead,
    template: &'a str,
}

pub fn options(models: &StageModels) -> InvokeOptions {
    InvokeOptions::new(models.primary.clone()).strict_json(true)
}

pub async fn personalize_outreach(
    client: &dyn GenerationClient,
    models: &StageModels,
    lead: &Lead,
    template_id: &str,
) -> Result<OutreachDraft, GenerationError> {
    let input = serialize_input(
        INPUT_SCHEMA,
        &OutreachInput {
            lead,
            template: template_id,
        },
    );
    run_json_stage::<LlmOutreachDraft, _, _>(
        client,
        StageName::OutreachPersonalizer,
        input,
        &options(models),
        LlmOutreachDraft::validate_and_into_draft,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{models, ScriptedClient};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn sends_lead_fields_through() {
        let client = ScriptedClient::new().respond(
            StageName::OutreachPersonalizer,
            "```json\n{\"subject\":\"Fewer mispicks at Acme\",\"body\":\"Hi Dana, ...\"}\n```",
        );
        let lead: Lead = serde_json::from_value(json!({
            "name": "Dana",
            "company": "Acme Logistics",
            "warehouses": 3
        }))
        .unwrap();

        let draft = personalize_outreach(&client, &models(), &lead, "ops-intro-v2")
            .await
            .unwrap();
        assert_eq!(draft.subject, "Fewer mispicks at Acme");

        let call = client.last_call(StageName::OutreachPersonalizer).unwrap();
        let sent: Value = serde_json::from_str(&call.user_content).unwrap();
        assert_eq!(sent["template"], "ops-intro-v2");
        assert_eq!(sent["lead"]["warehouses"], 3);
    }

    #[tokio::test]
    async fn missing_body_is_a_parse_error() {
        let client =
            ScriptedClient::new().respond(StageName::OutreachPersonalizer, r#"{"subject":"Hi"}"#);
        let err = personalize_outreach(&client, &models(), &Lead::default(), "t")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "stage_output_parse");
    }
}
