use crate::llm::error::GenerationError;
use crate::llm::{GenerationClient, InvokeOptions, StageModels};
use crate::stages::{invoke_stage, StageName};

pub const SYSTEM_PROMPT: &str = concat!(
    "You are the SOP WRITER for ClearSight Ops.\n",
    "Create a clear, step-by-step Standard Operating Procedure.\n",
    "Format as numbered steps with clear actions.\n",
    "Keep it concise and actionable.",
);

pub fn options(models: &StageModels) -> InvokeOptions {
    InvokeOptions::new(models.primary.clone())
}

/// Free text; the numbered-step layout is requested, not checked.
pub async fn write_sop(
    client: &dyn GenerationClient,
    models: &StageModels,
    topic: &str,
    context: &str,
) -> Result<String, GenerationError> {
    let input = format!("Topic: {topic}\nContext: {context}");
    let text = invoke_stage(client, StageName::SopWriter, &input, &options(models)).await?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{models, ScriptedClient};

    #[tokio::test]
    async fn passes_topic_and_context_as_plain_text() {
        let client = ScriptedClient::new().respond(
            StageName::SopWriter,
            "\n1. Scan the tote.\n2. Confirm the bin.\n",
        );
        let sop = write_sop(&client, &models(), "Mispick recovery", "Zone B scanners")
            .await
            .unwrap();
        assert_eq!(sop, "1. Scan the tote.\n2. Confirm the bin.");

        let call = client.last_call(StageName::SopWriter).unwrap();
        assert_eq!(call.user_content, "Topic: Mispick recovery\nContext: Zone B scanners");
    }

    #[tokio::test]
    async fn prose_is_fine_for_sops() {
        let client = ScriptedClient::new().respond(StageName::SopWriter, "Not numbered at all");
        assert!(write_sop(&client, &models(), "t", "c").await.is_ok());
    }
}
