//! Two-stage analysis: a health analysis that must succeed, followed by investment
//! recommendations that may be dropped without failing the request.

use crate::domain::analysis::{
    AnalysisFields, AnalysisKey, AnalysisOutcome, HealthAnalysis, InvestmentRecommendation,
    MonthlySummary, Recommendations, UpsertOutcome,
};
use crate::domain::contract::{LlmHealthAnalysis, LlmInvestmentRecommendations};
use crate::llm::json::parse_generation;
use crate::llm::{prompts, GenerateRequest, LlmClient};
use crate::metrics::{compute_metrics, FinancialInputs, FinancialMetrics};
use crate::storage::AnalysisStore;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

pub const HISTORY_MONTHS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistStatus {
    /// Caller was not signed in; nothing is stored.
    Anonymous,
    Saved { outcome: UpsertOutcome },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub metrics: FinancialMetrics,
    pub outcome: AnalysisOutcome,
    pub persisted: PersistStatus,
}

#[derive(Clone)]
pub struct RecommendationAggregator {
    llm: Arc<dyn LlmClient>,
    store: Option<Arc<dyn AnalysisStore>>,
}

impl RecommendationAggregator {
    /// Without a store, history is empty and signed-in results report a failed save.
    pub fn new(llm: Arc<dyn LlmClient>, store: Option<Arc<dyn AnalysisStore>>) -> Self {
        Self { llm, store }
    }

    /// Runs both generation stages in order. `key` is present only for signed-in callers and
    /// enables history in the prompt and saving of the result.
    pub async fn analyze(
        &self,
        inputs: FinancialInputs,
        key: Option<AnalysisKey>,
    ) -> anyhow::Result<AnalysisReport> {
        let metrics = compute_metrics(&inputs);

        let history = match key {
            Some(key) => self.load_history(key).await,
            None => Vec::new(),
        };

        let health = self
            .health_analysis(&metrics, &history)
            .await
            .context("health analysis failed")?;

        let outcome = match self.investment_recommendations(&metrics, &health).await {
            Ok(investments) => AnalysisOutcome::Complete {
                health,
                investments,
            },
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "investment recommendations unavailable; returning health analysis only");
                AnalysisOutcome::PartialMissingInvestments {
                    health,
                    reason: format!("{err:#}"),
                }
            }
        };

        let persisted = match key {
            Some(key) => self.persist(key, &metrics, &outcome).await,
            None => PersistStatus::Anonymous,
        };

        Ok(AnalysisReport {
            metrics,
            outcome,
            persisted,
        })
    }

    async fn load_history(&self, key: AnalysisKey) -> Vec<MonthlySummary> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.recent(key.user_id, HISTORY_MONTHS as i64 + 1).await {
            Ok(rows) => rows
                .iter()
                .filter(|r| !(r.key.month == key.month && r.key.year == key.year))
                .take(HISTORY_MONTHS)
                .map(MonthlySummary::from)
                .collect(),
            Err(err) => {
                tracing::warn!(user_id = %key.user_id, error = %err, "failed to load analysis history; continuing without it");
                Vec::new()
            }
        }
    }

    async fn health_analysis(
        &self,
        metrics: &FinancialMetrics,
        history: &[MonthlySummary],
    ) -> anyhow::Result<HealthAnalysis> {
        let request = GenerateRequest::text(
            prompts::health_system_prompt(),
            prompts::health_user_prompt(metrics, history),
        )
        .with_tool(prompts::health_tool());

        let generation = self.llm.generate(request).await?;
        let parsed: LlmHealthAnalysis =
            parse_generation(&generation, prompts::TOOL_EMIT_HEALTH_ANALYSIS)?;
        parsed.validate_and_into_health(metrics)
    }

    async fn investment_recommendations(
        &self,
        metrics: &FinancialMetrics,
        health: &HealthAnalysis,
    ) -> anyhow::Result<Vec<InvestmentRecommendation>> {
        let request = GenerateRequest::text(
            prompts::investments_system_prompt(),
            prompts::investments_user_prompt(metrics, health.health_score, health.credit_score),
        )
        .with_tool(prompts::investments_tool());

        let generation = self.llm.generate(request).await?;
        let parsed: LlmInvestmentRecommendations =
            parse_generation(&generation, prompts::TOOL_EMIT_INVESTMENTS)?;
        parsed.validate_and_into_recommendations()
    }

    async fn persist(
        &self,
        key: AnalysisKey,
        metrics: &FinancialMetrics,
        outcome: &AnalysisOutcome,
    ) -> PersistStatus {
        let Some(store) = &self.store else {
            tracing::warn!(user_id = %key.user_id, "analysis complete but not saved: no analysis store");
            return PersistStatus::Failed {
                error: "analysis store unavailable".to_string(),
            };
        };
        let fields = analysis_fields(metrics, outcome);
        match store.upsert(key, &fields).await {
            Ok(outcome) => {
                tracing::info!(user_id = %key.user_id, month = key.month, year = key.year, ?outcome, "saved financial analysis");
                PersistStatus::Saved { outcome }
            }
            Err(err) => {
                tracing::warn!(user_id = %key.user_id, error = %format!("{err:#}"), "analysis complete but not saved");
                PersistStatus::Failed {
                    error: format!("{err:#}"),
                }
            }
        }
    }
}

/// Maps a finished analysis onto the stored row shape.
pub fn analysis_fields(metrics: &FinancialMetrics, outcome: &AnalysisOutcome) -> AnalysisFields {
    let health = outcome.health();
    AnalysisFields {
        monthly_income: Some(metrics.income),
        monthly_expenses: Some(metrics.expenses),
        debt_amount: Some(metrics.debt),
        credit_score: Some(health.credit_score),
        financial_score: Some(health.health_score),
        credit_utilization: Some(health.credit_utilization),
        debt_to_income_ratio: Some(health.debt_to_income_ratio),
        recommendations: Some(Recommendations {
            insights: health.insights.clone(),
            actions: health.recommendations.clone(),
            investments: outcome.investments().map(<[_]>::to_vec),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::{gateway_status, GatewayStatus};
    use crate::testing::{MemoryAnalysisStore, Scripted, ScriptedLlm};
    use serde_json::json;
    use uuid::Uuid;

    fn inputs() -> FinancialInputs {
        FinancialInputs {
            income: 2500.0,
            expenses: 1900.0,
            debt: 1200.0,
            credit_score: None,
        }
    }

    fn key(month: u32) -> AnalysisKey {
        AnalysisKey::new(Uuid::nil(), month, 2026).unwrap()
    }

    fn health_reply(score: u32) -> Scripted {
        ScriptedLlm::tool(
            prompts::TOOL_EMIT_HEALTH_ANALYSIS,
            json!({
                "healthScore": score,
                "estimatedCreditScore": 690,
                "insights": ["You save 24% of income"],
                "recommendations": ["Pay down the card balance"]
            }),
        )
    }

    fn investments_reply() -> Scripted {
        ScriptedLlm::tool(
            prompts::TOOL_EMIT_INVESTMENTS,
            json!({
                "recommendations": [{
                    "category": "Stocks & Shares ISA",
                    "riskLevel": "medium",
                    "timeHorizon": "5+ years",
                    "reasoning": "Tax-free growth",
                    "suggestions": ["Global index tracker"]
                }]
            }),
        )
    }

    fn aggregator(llm: Arc<ScriptedLlm>, store: Arc<MemoryAnalysisStore>) -> RecommendationAggregator {
        RecommendationAggregator::new(llm, Some(store as Arc<dyn AnalysisStore>))
    }

    #[tokio::test]
    async fn complete_analysis_merges_both_calls() {
        let llm = Arc::new(ScriptedLlm::new(vec![health_reply(72), investments_reply()]));
        let store = Arc::new(MemoryAnalysisStore::default());
        let report = aggregator(llm.clone(), store.clone())
            .analyze(inputs(), None)
            .await
            .unwrap();

        let result = report.outcome.to_result();
        assert_eq!(result.health_score, 72);
        assert_eq!(result.credit_score, 690);
        assert_eq!(result.debt_to_income_ratio, 4.0);
        assert_eq!(result.credit_utilization, 24.0);
        assert_eq!(result.investment_recommendations.unwrap().len(), 1);
        assert_eq!(report.persisted, PersistStatus::Anonymous);
        assert_eq!(llm.request_count(), 2);
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_call_failure_degrades_to_partial() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            health_reply(55),
            Scripted::Fail("connection reset"),
        ]));
        let report = aggregator(llm, Arc::new(MemoryAnalysisStore::default()))
            .analyze(inputs(), None)
            .await
            .unwrap();

        assert!(report.outcome.is_partial());
        let result = report.outcome.to_result();
        assert_eq!(result.health_score, 55);
        assert_eq!(result.insights, vec!["You save 24% of income".to_string()]);
        assert!(result.investment_recommendations.is_none());
    }

    #[tokio::test]
    async fn unparseable_second_call_degrades_to_partial() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            health_reply(55),
            ScriptedLlm::text("Sorry, I can't recommend investments."),
        ]));
        let report = aggregator(llm, Arc::new(MemoryAnalysisStore::default()))
            .analyze(inputs(), None)
            .await
            .unwrap();
        assert!(report.outcome.is_partial());
    }

    #[tokio::test]
    async fn first_call_parse_failure_is_fatal() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text("not json at all")]));
        let store = Arc::new(MemoryAnalysisStore::default());
        let res = aggregator(llm.clone(), store.clone())
            .analyze(inputs(), Some(key(3)))
            .await;
        assert!(res.is_err());
        assert_eq!(llm.request_count(), 1);
        assert!(store.row(key(3)).is_none());
    }

    #[tokio::test]
    async fn first_call_rate_limit_is_surfaced() {
        let llm = Arc::new(ScriptedLlm::new(vec![Scripted::Status(GatewayStatus::RateLimited)]));
        let err = aggregator(llm, Arc::new(MemoryAnalysisStore::default()))
            .analyze(inputs(), None)
            .await
            .unwrap_err();
        assert_eq!(gateway_status(&err), Some(GatewayStatus::RateLimited));
    }

    #[tokio::test]
    async fn fenced_text_reply_is_accepted_for_first_call() {
        let text = format!(
            "```json\n{}\n```",
            json!({
                "healthScore": 61,
                "estimatedCreditScore": 700,
                "insights": ["a"],
                "recommendations": ["b"]
            })
        );
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text(text), investments_reply()]));
        let report = aggregator(llm, Arc::new(MemoryAnalysisStore::default()))
            .analyze(inputs(), None)
            .await
            .unwrap();
        assert_eq!(report.outcome.health().health_score, 61);
    }

    #[tokio::test]
    async fn resubmission_for_same_month_overwrites_single_row() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            health_reply(50),
            investments_reply(),
            health_reply(80),
            Scripted::Fail("boom"),
        ]));
        let store = Arc::new(MemoryAnalysisStore::default());
        let agg = aggregator(llm, store.clone());

        let first = agg.analyze(inputs(), Some(key(3))).await.unwrap();
        assert_eq!(
            first.persisted,
            PersistStatus::Saved {
                outcome: UpsertOutcome::Inserted
            }
        );

        let mut second_inputs = inputs();
        second_inputs.expenses = 2000.0;
        let second = agg.analyze(second_inputs, Some(key(3))).await.unwrap();
        assert_eq!(
            second.persisted,
            PersistStatus::Saved {
                outcome: UpsertOutcome::Updated
            }
        );

        let rows = store.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        let row = rows.get(&key(3)).unwrap();
        assert_eq!(row.financial_score, 80);
        assert_eq!(row.monthly_expenses, 2000.0);
        assert_eq!(row.monthly_available, Some(500.0));
        assert!(row.recommendations.as_ref().unwrap().investments.is_none());
    }

    #[tokio::test]
    async fn save_failure_still_returns_analysis() {
        let llm = Arc::new(ScriptedLlm::new(vec![health_reply(70), investments_reply()]));
        let report = aggregator(llm, Arc::new(MemoryAnalysisStore::failing()))
            .analyze(inputs(), Some(key(3)))
            .await
            .unwrap();
        assert!(matches!(report.persisted, PersistStatus::Failed { .. }));
        assert_eq!(report.outcome.health().health_score, 70);
    }

    #[tokio::test]
    async fn signed_in_without_store_is_not_saved() {
        let llm = Arc::new(ScriptedLlm::new(vec![health_reply(70), investments_reply()]));
        let report = RecommendationAggregator::new(llm, None)
            .analyze(inputs(), Some(key(3)))
            .await
            .unwrap();
        assert!(matches!(report.persisted, PersistStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn history_excludes_current_month_and_is_newest_first() {
        let store = Arc::new(MemoryAnalysisStore::default());
        for month in 1..=3 {
            let fields = AnalysisFields {
                monthly_income: Some(2500.0),
                monthly_expenses: Some(2000.0 + month as f64),
                debt_amount: Some(1000.0),
                credit_score: Some(700),
                financial_score: Some(60),
                ..Default::default()
            };
            store.upsert(key(month), &fields).await.unwrap();
        }

        let llm = Arc::new(ScriptedLlm::new(vec![health_reply(70), investments_reply()]));
        aggregator(llm.clone(), store)
            .analyze(inputs(), Some(key(3)))
            .await
            .unwrap();

        let requests = llm.requests.lock().unwrap();
        let prompt = &requests[0].user;
        assert!(!prompt.contains("2026-03"));
        let feb = prompt.find("2026-02").unwrap();
        let jan = prompt.find("2026-01").unwrap();
        assert!(feb < jan);
        assert!(requests[1].user.contains("Financial Health Score: 70/100"));
    }
}
