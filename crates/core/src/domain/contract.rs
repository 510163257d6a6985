use crate::domain::analysis::{HealthAnalysis, InvestmentRecommendation, Suggestion};
use crate::domain::receipt::ExtractedReceipt;
use crate::metrics::FinancialMetrics;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

const DESCRIPTION_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmHealthAnalysis {
    pub health_score: f64,
    #[serde(default)]
    pub estimated_credit_score: Option<f64>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

impl LlmHealthAnalysis {
    /// Merges the generated analysis with the locally computed ratios. A credit score the user
    /// supplied always wins over the estimate.
    pub fn validate_and_into_health(
        self,
        metrics: &FinancialMetrics,
    ) -> anyhow::Result<HealthAnalysis> {
        ensure!(
            self.health_score.is_finite() && (0.0..=100.0).contains(&self.health_score),
            "healthScore must be between 0 and 100 (got {})",
            self.health_score
        );

        let credit_score = match (metrics.credit_score, self.estimated_credit_score) {
            (Some(user), _) => user,
            (None, Some(estimated)) => estimated,
            (None, None) => anyhow::bail!("estimatedCreditScore is required when no credit score was supplied"),
        };
        ensure!(
            credit_score.is_finite() && credit_score >= 0.0,
            "credit score must be a non-negative number (got {credit_score})"
        );

        let insights = non_empty_lines(self.insights);
        let recommendations = non_empty_lines(self.recommendations);
        ensure!(!insights.is_empty(), "insights must be non-empty");
        ensure!(!recommendations.is_empty(), "recommendations must be non-empty");

        Ok(HealthAnalysis {
            health_score: self.health_score.round() as i32,
            credit_score: credit_score.round() as i32,
            debt_to_income_ratio: metrics.debt_to_income_ratio,
            credit_utilization: metrics.credit_utilization,
            insights,
            recommendations,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInvestmentRecommendations {
    pub recommendations: Vec<InvestmentRecommendation>,
}

impl LlmInvestmentRecommendations {
    pub fn validate_and_into_recommendations(
        self,
    ) -> anyhow::Result<Vec<InvestmentRecommendation>> {
        ensure!(
            !self.recommendations.is_empty(),
            "recommendations must be non-empty"
        );

        let mut out = Vec::with_capacity(self.recommendations.len());
        for rec in self.recommendations {
            let category = rec.category.trim().to_string();
            ensure!(!category.is_empty(), "category must be non-empty");
            let suggestions = rec
                .suggestions
                .into_iter()
                .filter(|s| match s {
                    Suggestion::Text(t) => !t.trim().is_empty(),
                    Suggestion::Structured(s) => !s.name.trim().is_empty(),
                })
                .collect();
            out.push(InvestmentRecommendation {
                category,
                risk_level: rec.risk_level,
                time_horizon: rec.time_horizon.trim().to_string(),
                reasoning: rec.reasoning.trim().to_string(),
                suggestions,
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmReceiptExtraction {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LlmReceiptExtraction {
    /// A missing amount means none was found on the receipt and is recorded as zero.
    pub fn validate_and_into_receipt(self) -> anyhow::Result<ExtractedReceipt> {
        let amount = self.amount.unwrap_or(0.0);
        ensure!(
            amount.is_finite() && amount >= 0.0,
            "receipt amount must be a non-negative number (got {amount})"
        );

        let description = self
            .description
            .map(|d| d.trim().chars().take(DESCRIPTION_MAX_CHARS).collect::<String>())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "Receipt".to_string());

        Ok(ExtractedReceipt {
            amount,
            description,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparedInvestment {
    pub name: String,
    pub risk: String,
    pub expected_return: String,
    pub recommendation: String,
    pub suitability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentComparison {
    pub investments: Vec<ComparedInvestment>,
    pub best_choice: String,
    pub reasoning: String,
}

impl InvestmentComparison {
    pub fn validate(self, expected_len: usize) -> anyhow::Result<Self> {
        ensure!(
            self.investments.len() == expected_len,
            "comparison must cover exactly {expected_len} investments (got {})",
            self.investments.len()
        );
        for inv in &self.investments {
            ensure!(!inv.name.trim().is_empty(), "investment name must be non-empty");
            ensure!(
                (0.0..=100.0).contains(&inv.suitability),
                "suitability must be between 0 and 100 (got {})",
                inv.suitability
            );
        }
        ensure!(!self.best_choice.trim().is_empty(), "bestChoice must be non-empty");
        Ok(self)
    }
}

fn non_empty_lines(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{compute_metrics, FinancialInputs};
    use serde_json::json;

    fn metrics(credit_score: Option<f64>) -> FinancialMetrics {
        compute_metrics(&FinancialInputs {
            income: 2500.0,
            expenses: 1900.0,
            debt: 1200.0,
            credit_score,
        })
    }

    fn health(estimated: Option<f64>) -> LlmHealthAnalysis {
        LlmHealthAnalysis {
            health_score: 72.4,
            estimated_credit_score: estimated,
            insights: vec![" Spending is 76% of income ".into(), "".into()],
            recommendations: vec!["Build an emergency fund".into()],
        }
    }

    #[test]
    fn user_credit_score_wins_over_estimate() {
        let h = health(Some(650.0))
            .validate_and_into_health(&metrics(Some(720.0)))
            .unwrap();
        assert_eq!(h.credit_score, 720);
        assert_eq!(h.health_score, 72);
        assert_eq!(h.insights, vec!["Spending is 76% of income".to_string()]);
    }

    #[test]
    fn estimate_used_when_user_omits_score() {
        let h = health(Some(650.0)).validate_and_into_health(&metrics(None)).unwrap();
        assert_eq!(h.credit_score, 650);
        assert_eq!(h.debt_to_income_ratio, 4.0);
    }

    #[test]
    fn missing_any_credit_score_is_rejected() {
        assert!(health(None).validate_and_into_health(&metrics(None)).is_err());
    }

    #[test]
    fn out_of_range_health_score_is_rejected() {
        let mut h = health(Some(650.0));
        h.health_score = 140.0;
        assert!(h.validate_and_into_health(&metrics(None)).is_err());
    }

    #[test]
    fn receipt_zero_amount_is_valid_and_description_defaults() {
        let parsed: LlmReceiptExtraction =
            serde_json::from_value(json!({"amount": 0, "description": "  "})).unwrap();
        let r = parsed.validate_and_into_receipt().unwrap();
        assert_eq!(r.amount, 0.0);
        assert_eq!(r.description, "Receipt");
    }

    #[test]
    fn receipt_negative_amount_is_rejected() {
        let parsed: LlmReceiptExtraction =
            serde_json::from_value(json!({"amount": -3.5, "description": "refund"})).unwrap();
        assert!(parsed.validate_and_into_receipt().is_err());
    }

    #[test]
    fn investment_recommendations_drop_blank_suggestions() {
        let parsed: LlmInvestmentRecommendations = serde_json::from_value(json!({
            "recommendations": [{
                "category": " Emergency fund ",
                "riskLevel": "low",
                "timeHorizon": "0-1 years",
                "reasoning": "Cover 3 months of expenses",
                "suggestions": ["Easy-access savings", ""]
            }]
        }))
        .unwrap();
        let recs = parsed.validate_and_into_recommendations().unwrap();
        assert_eq!(recs[0].category, "Emergency fund");
        assert_eq!(recs[0].suggestions.len(), 1);
    }

    #[test]
    fn comparison_requires_one_entry_per_investment() {
        let cmp: InvestmentComparison = serde_json::from_value(json!({
            "investments": [{
                "name": "S&P 500 ETF",
                "risk": "Medium",
                "expectedReturn": "7-10%",
                "recommendation": "Solid core holding",
                "suitability": 85
            }],
            "bestChoice": "S&P 500 ETF",
            "reasoning": "Low cost"
        }))
        .unwrap();
        assert!(cmp.clone().validate(1).is_ok());
        assert!(cmp.validate(2).is_err());
    }
}
