//! Sequences the stages. Each stage's prompt embeds the previous stage's typed output, so
//! nothing here runs concurrently within one invocation.

use crate::domain::report::{
    DailyReport, DailyReportPayload, IssueScan, Lead, OutreachDraft, SupportReply, SupportRequest,
};
use crate::domain::snapshot::RawOperationalSnapshot;
use crate::llm::error::GenerationError;
use crate::llm::{GenerationClient, Provider, StageModels};
use crate::stages::{
    issue_detector, kpi_analyzer, outreach, report_composer, sop_writer, strategist,
    support_replier,
};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;

/// Holds no per-run state, so one instance can serve concurrent invocations.
#[derive(Clone)]
pub struct Pipeline {
    client: Arc<dyn GenerationClient>,
    models: StageModels,
}

impl Pipeline {
    pub fn new(client: Arc<dyn GenerationClient>, models: StageModels) -> Self {
        Self { client, models }
    }

    pub fn provider(&self) -> Provider {
        self.client.provider()
    }

    /// KPI Analyzer → Issue Detector → Strategist → Report Composer.
    ///
    /// The first failing stage aborts the run; no partial payload is returned.
    pub async fn run_daily_pipeline(
        &self,
        snapshot: &RawOperationalSnapshot,
        date: NaiveDate,
    ) -> Result<DailyReport, GenerationError> {
        let t0 = Instant::now();
        let client = self.client.as_ref();

        let kpis = kpi_analyzer::analyze_kpis(client, &self.models, snapshot).await?;
        let issues = issue_detector::detect_issues(client, &self.models, snapshot, &kpis).await?;
        let actions = strategist::generate_actions(client, &self.models, &kpis, &issues).await?;

        let payload = DailyReportPayload {
            date,
            kpis,
            issues,
            actions,
            // Placeholder; no stage computes a forecast yet.
            forecast: None,
        };

        let narrative = report_composer::compose_report(client, &self.models, &payload).await?;

        tracing::info!(
            report_date = %date,
            kpis = payload.kpis.len(),
            issues = payload.issues.len(),
            actions = payload.actions.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "daily pipeline complete"
        );

        Ok(DailyReport { payload, narrative })
    }

    /// KPI Analyzer → Issue Detector only, for monitoring between daily reports.
    pub async fn run_issue_detection(
        &self,
        snapshot: &RawOperationalSnapshot,
    ) -> Result<IssueScan, GenerationError> {
        let client = self.client.as_ref();
        let kpis = kpi_analyzer::analyze_kpis(client, &self.models, snapshot).await?;
        let issues = issue_detector::detect_issues(client, &self.models, snapshot, &kpis).await?;
        Ok(IssueScan { kpis, issues })
    }

    pub async fn draft_support_reply(
        &self,
        request: &SupportRequest,
    ) -> Result<SupportReply, GenerationError> {
        let reply =
            support_replier::draft_support_reply(self.client.as_ref(), &self.models, request)
                .await?;
        tracing::info!(
            classification = %reply.classification,
            urgency = %reply.urgency,
            needs_human_review = reply.needs_human_review,
            "support reply drafted"
        );
        Ok(reply)
    }

    pub async fn personalize_outreach(
        &self,
        lead: &Lead,
        template_id: &str,
    ) -> Result<OutreachDraft, GenerationError> {
        outreach::personalize_outreach(self.client.as_ref(), &self.models, lead, template_id).await
    }

    pub async fn write_sop(&self, topic: &str, context: &str) -> Result<String, GenerationError> {
        sop_writer::write_sop(self.client.as_ref(), &self.models, topic, context).await
    }
}
