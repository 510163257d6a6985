//! Side-by-side comparison of up to three named investments for a monthly contribution.

use crate::domain::contract::InvestmentComparison;
use crate::domain::validation::ValidationError;
use crate::llm::json::parse_generation;
use crate::llm::{prompts, GenerateRequest, LlmClient};
use crate::metrics::{required, FormNumber};
use anyhow::Context;
use serde::Deserialize;

pub const MAX_COMPARED: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonForm {
    #[serde(default)]
    pub investment1: Option<String>,
    #[serde(default)]
    pub investment2: Option<String>,
    #[serde(default)]
    pub investment3: Option<String>,
    pub monthly_investment: FormNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRequest {
    pub investments: Vec<String>,
    pub monthly_amount: f64,
}

impl ComparisonRequest {
    /// Blank slots are dropped; at least one named investment is required.
    pub fn from_form(form: &ComparisonForm) -> Result<Self, ValidationError> {
        let investments: Vec<String> = [&form.investment1, &form.investment2, &form.investment3]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if investments.is_empty() {
            return Err(ValidationError::new(
                "investments",
                "at least one investment is required",
            ));
        }
        let monthly_amount = required(&form.monthly_investment, "monthlyInvestment")?;
        Ok(Self {
            investments,
            monthly_amount,
        })
    }
}

pub async fn compare_investments(
    llm: &dyn LlmClient,
    request: &ComparisonRequest,
) -> anyhow::Result<InvestmentComparison> {
    anyhow::ensure!(
        (1..=MAX_COMPARED).contains(&request.investments.len()),
        "between 1 and {MAX_COMPARED} investments can be compared"
    );

    let generation = llm
        .generate(
            GenerateRequest::text(
                prompts::comparison_system_prompt(),
                prompts::comparison_user_prompt(&request.investments, request.monthly_amount),
            )
            .with_tool(prompts::comparison_tool()),
        )
        .await
        .context("investment comparison call failed")?;

    let parsed: InvestmentComparison =
        parse_generation(&generation, prompts::TOOL_EMIT_COMPARISON)
            .context("failed to parse investment comparison")?;
    parsed.validate(request.investments.len())
}
