//! In-memory stand-ins for the generation service.

use crate::llm::error::GenerationError;
use crate::llm::{ChatTransport, GenerationClient, InvokeOptions, Provider, TransportError};
use crate::stages::StageName;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub system_role: String,
    pub user_content: String,
    pub options: InvokeOptions,
}

/// Replays a fixed list of transport outcomes, in order.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Option<String>, TransportError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<Option<String>, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatTransport for ScriptedTransport {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn complete(
        &self,
        system_role: &str,
        user_content: &str,
        options: &InvokeOptions,
    ) -> Result<Option<String>, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_role: system_role.to_string(),
            user_content: user_content.to_string(),
            options: options.clone(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted transport ran out of responses")
    }
}

/// Answers each stage from its own queue, recognising the stage by its system prompt.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: Mutex<HashMap<StageName, VecDeque<Result<String, GenerationError>>>>,
    calls: Mutex<Vec<(StageName, RecordedCall)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, stage: StageName, text: impl Into<String>) -> Self {
        self.push(stage, Ok(text.into()))
    }

    pub fn fail(self, stage: StageName, err: GenerationError) -> Self {
        self.push(stage, Err(err))
    }

    fn push(self, stage: StageName, outcome: Result<String, GenerationError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn stages_called(&self) -> Vec<StageName> {
        self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    pub fn call_count(&self, stage: StageName) -> usize {
        self.stages_called().into_iter().filter(|s| *s == stage).count()
    }

    pub fn last_call(&self, stage: StageName) -> Option<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|(_, c)| c.clone())
    }
}

#[async_trait::async_trait]
impl GenerationClient for ScriptedClient {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn invoke(
        &self,
        system_role: &str,
        user_content: &str,
        options: &InvokeOptions,
    ) -> Result<String, GenerationError> {
        let stage = StageName::ALL
            .into_iter()
            .find(|s| s.system_prompt() == system_role)
            .expect("system prompt does not belong to any stage");

        self.calls.lock().unwrap().push((
            stage,
            RecordedCall {
                system_role: system_role.to_string(),
                user_content: user_content.to_string(),
                options: options.clone(),
            },
        ));

        self.responses
            .lock()
            .unwrap()
            .get_mut(&stage)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no scripted response for stage {stage}"))
    }
}

/// The reference day used across pipeline tests.
pub fn example_snapshot() -> crate::domain::snapshot::RawOperationalSnapshot {
    serde_json::from_value(serde_json::json!({
        "sales": {"salesToday": 14329, "orders": 421, "returns": 9},
        "warehouse": {"pickAccuracy": 98.7, "cph": 28, "mispicks": 3, "overtimeHours": 3.2, "stuckOrders": 1},
        "staff": {"headcount": 18, "shifts": [{"name": "Morning", "workers": 7}], "overtimeRisk": false},
        "support": {"ticketsToday": 12, "autoResolved": 8, "csat": 4.5, "refundTickets": 9},
        "finance": {"revenue": 14329, "refundsAmount": 420, "grossMarginPct": 38}
    }))
    .expect("example snapshot is valid")
}

pub fn models() -> crate::llm::StageModels {
    crate::llm::StageModels::defaults_for(Provider::OpenAI)
}
