use crate::llm::error::GenerationError;
use crate::stages::StageName;
use serde::de::DeserializeOwned;

const EXCERPT_CHARS: usize = 200;
const FENCE: &str = "```";

/// Strips code-fence shells and surrounding whitespace from model output.
///
/// Total and idempotent: the shell is peeled until nothing changes, so running the result
/// through again is a no-op.
pub fn normalize(text: &str) -> String {
    let mut current = text.trim();
    loop {
        let next = strip_fence_once(current);
        if next.len() == current.len() {
            return current.to_string();
        }
        current = next;
    }
}

fn strip_fence_once(text: &str) -> &str {
    let mut inner = text;
    if let Some(after_open) = inner.strip_prefix(FENCE) {
        // A language tag ("json", "JSON", ...) counts when whitespace or the payload's opening
        // bracket follows it.
        let tag_len = after_open
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after_open.len());
        let rest = &after_open[tag_len..];
        let tag_ends = rest.is_empty()
            || rest.starts_with(char::is_whitespace)
            || rest.starts_with(['[', '{']);
        inner = if tag_ends { rest } else { after_open };
    }
    if let Some(before_close) = inner.strip_suffix(FENCE) {
        inner = before_close;
    }
    inner.trim()
}

/// First characters of `text`, for error messages and logs.
pub fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Normalizes then strictly deserializes model output into `T`.
pub fn parse_stage_output<T: DeserializeOwned>(
    stage: StageName,
    text: &str,
) -> Result<T, GenerationError> {
    let cleaned = normalize(text);
    serde_json::from_str::<T>(&cleaned).map_err(|err| {
        tracing::warn!(%stage, error = %err, excerpt = %excerpt(&cleaned), "stage output failed to parse");
        GenerationError::StageOutputParse {
            stage,
            detail: err.to_string(),
            excerpt: excerpt(&cleaned),
        }
    })
}
