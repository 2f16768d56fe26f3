//! One module per stage. Each owns a fixed system prompt, a versioned input shape and the
//! contract its output is checked against.

pub mod issue_detector;
pub mod kpi_analyzer;
pub mod outreach;
pub mod report_composer;
pub mod sop_writer;
pub mod strategist;
pub mod support_replier;

use crate::llm::error::GenerationError;
use crate::llm::json::{excerpt, normalize, parse_stage_output};
use crate::llm::{GenerationClient, InvokeOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    KpiAnalyzer,
    IssueDetector,
    Strategist,
    ReportComposer,
    SopWriter,
    SupportReplier,
    OutreachPersonalizer,
}

impl StageName {
    pub const ALL: [StageName; 7] = [
        Self::KpiAnalyzer,
        Self::IssueDetector,
        Self::Strategist,
        Self::ReportComposer,
        Self::SopWriter,
        Self::SupportReplier,
        Self::OutreachPersonalizer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KpiAnalyzer => "kpi_analyzer",
            Self::IssueDetector => "issue_detector",
            Self::Strategist => "strategist",
            Self::ReportComposer => "report_composer",
            Self::SopWriter => "sop_writer",
            Self::SupportReplier => "support_replier",
            Self::OutreachPersonalizer => "outreach_personalizer",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::KpiAnalyzer => kpi_analyzer::SYSTEM_PROMPT,
            Self::IssueDetector => issue_detector::SYSTEM_PROMPT,
            Self::Strategist => strategist::SYSTEM_PROMPT,
            Self::ReportComposer => report_composer::SYSTEM_PROMPT,
            Self::SopWriter => sop_writer::SYSTEM_PROMPT,
            Self::SupportReplier => support_replier::SYSTEM_PROMPT,
            Self::OutreachPersonalizer => outreach::SYSTEM_PROMPT,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage input as sent to the model: the payload plus a schema tag naming its version.
#[derive(Debug, Serialize)]
struct TaggedInput<'a, T: Serialize> {
    schema: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

pub(crate) fn serialize_input<T: Serialize>(schema: &'static str, body: &T) -> String {
    // Stage inputs are plain derived structs with string keys; serialization cannot fail.
    serde_json::to_string(&TaggedInput { schema, body }).expect("stage input serialize failed")
}

/// Calls the model, then runs the two-step check: strict parse into `W`, then `validate`.
pub(crate) async fn run_json_stage<W, O, F>(
    client: &dyn GenerationClient,
    stage: StageName,
    user_content: String,
    options: &InvokeOptions,
    validate: F,
) -> Result<O, GenerationError>
where
    W: DeserializeOwned,
    F: FnOnce(W) -> anyhow::Result<O>,
{
    let text = invoke_stage(client, stage, &user_content, options).await?;
    let wire = parse_stage_output::<W>(stage, &text)?;
    validate(wire).map_err(|err| {
        let detail = format!("{err:#}");
        tracing::warn!(%stage, error = %detail, "stage output failed validation");
        GenerationError::StageOutputValidation {
            stage,
            detail,
            excerpt: excerpt(&normalize(&text)),
        }
    })
}

pub(crate) async fn invoke_stage(
    client: &dyn GenerationClient,
    stage: StageName,
    user_content: &str,
    options: &InvokeOptions,
) -> Result<String, GenerationError> {
    let t0 = Instant::now();
    tracing::debug!(%stage, model = %options.model, input_chars = user_content.len(), "stage started");
    let text = client
        .invoke(stage.system_prompt(), user_content, options)
        .await
        .inspect_err(|err| tracing::warn!(%stage, error = %err, "stage call failed"))?;
    tracing::info!(
        %stage,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        output_chars = text.len(),
        "stage returned"
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[derive(Serialize)]
    struct Body {
        a: u32,
    }

    #[test]
    fn serialized_input_carries_schema_tag() {
        let s = serialize_input("clearsight.test.input/v1", &Body { a: 1 });
        let v: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v, json!({"schema": "clearsight.test.input/v1", "a": 1}));
    }

    #[test]
    fn system_prompts_are_distinct() {
        for a in StageName::ALL {
            for b in StageName::ALL {
                if a != b {
                    assert_ne!(a.system_prompt(), b.system_prompt(), "{a} vs {b}");
                }
            }
        }
    }
}
