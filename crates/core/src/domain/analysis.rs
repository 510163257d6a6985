use crate::domain::validation::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One analysis row exists per user per calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisKey {
    pub user_id: Uuid,
    pub month: u32,
    pub year: i32,
}

impl AnalysisKey {
    pub fn new(user_id: Uuid, month: u32, year: i32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::new(
                "month",
                format!("must be between 1 and 12 (got {month})"),
            ));
        }
        Ok(Self {
            user_id,
            month,
            year,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Suggestion {
    Text(String),
    Structured(StructuredSuggestion),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredSuggestion {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentRecommendation {
    pub category: String,
    pub risk_level: RiskLevel,
    pub time_horizon: String,
    pub reasoning: String,
    pub suggestions: Vec<Suggestion>,
}

/// Document stored in `financial_analyses.recommendations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investments: Option<Vec<InvestmentRecommendation>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialAnalysis {
    pub id: Uuid,
    pub key: AnalysisKey,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub debt_amount: f64,
    pub credit_score: i32,
    pub financial_score: i32,
    pub credit_utilization: Option<f64>,
    pub debt_to_income_ratio: Option<f64>,
    pub monthly_available: Option<f64>,
    pub recommendations: Option<Recommendations>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column values for an upsert. `None` leaves the stored value untouched on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFields {
    pub monthly_income: Option<f64>,
    pub monthly_expenses: Option<f64>,
    pub debt_amount: Option<f64>,
    pub credit_score: Option<i32>,
    pub financial_score: Option<i32>,
    pub credit_utilization: Option<f64>,
    pub debt_to_income_ratio: Option<f64>,
    pub recommendations: Option<Recommendations>,
}

impl AnalysisFields {
    pub fn expenses_only(monthly_expenses: f64) -> Self {
        Self {
            monthly_expenses: Some(monthly_expenses),
            ..Default::default()
        }
    }

    /// True when every NOT NULL column is present, so a fresh row can be inserted.
    pub fn is_complete(&self) -> bool {
        self.monthly_income.is_some()
            && self.monthly_expenses.is_some()
            && self.debt_amount.is_some()
            && self.credit_score.is_some()
            && self.financial_score.is_some()
    }

    pub fn persisted_credit_utilization(&self) -> Option<f64> {
        self.credit_utilization.map(clamp_percentage)
    }
}

/// Applies `fields` over `existing` (or over nothing), keeping the derived columns consistent.
pub fn merge_fields(
    existing: Option<&FinancialAnalysis>,
    key: AnalysisKey,
    fields: &AnalysisFields,
    now: DateTime<Utc>,
) -> Option<FinancialAnalysis> {
    let merged = match existing {
        Some(row) => FinancialAnalysis {
            id: row.id,
            key,
            monthly_income: fields.monthly_income.unwrap_or(row.monthly_income),
            monthly_expenses: fields.monthly_expenses.unwrap_or(row.monthly_expenses),
            debt_amount: fields.debt_amount.unwrap_or(row.debt_amount),
            credit_score: fields.credit_score.unwrap_or(row.credit_score),
            financial_score: fields.financial_score.unwrap_or(row.financial_score),
            credit_utilization: fields
                .persisted_credit_utilization()
                .or(row.credit_utilization),
            debt_to_income_ratio: fields.debt_to_income_ratio.or(row.debt_to_income_ratio),
            monthly_available: None,
            recommendations: fields
                .recommendations
                .clone()
                .or_else(|| row.recommendations.clone()),
            created_at: row.created_at,
            updated_at: now,
        },
        None => {
            if !fields.is_complete() {
                return None;
            }
            FinancialAnalysis {
                id: Uuid::new_v4(),
                key,
                monthly_income: fields.monthly_income?,
                monthly_expenses: fields.monthly_expenses?,
                debt_amount: fields.debt_amount?,
                credit_score: fields.credit_score?,
                financial_score: fields.financial_score?,
                credit_utilization: fields.persisted_credit_utilization(),
                debt_to_income_ratio: fields.debt_to_income_ratio,
                monthly_available: None,
                recommendations: fields.recommendations.clone(),
                created_at: now,
                updated_at: now,
            }
        }
    };

    let monthly_available = Some(merged.monthly_income - merged.monthly_expenses);
    Some(FinancialAnalysis {
        monthly_available,
        ..merged
    })
}

pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        return value;
    }
    value.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Updated,
    Inserted,
    /// No row for the key and the fields were too partial to create one.
    Skipped,
}

/// Compact view of a past month, embedded in the health-analysis prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub month: u32,
    pub year: i32,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub debt_amount: f64,
    pub financial_score: i32,
    pub credit_score: i32,
}

impl From<&FinancialAnalysis> for MonthlySummary {
    fn from(row: &FinancialAnalysis) -> Self {
        Self {
            month: row.key.month,
            year: row.key.year,
            monthly_income: row.monthly_income,
            monthly_expenses: row.monthly_expenses,
            debt_amount: row.debt_amount,
            financial_score: row.financial_score,
            credit_score: row.credit_score,
        }
    }
}

/// Output of the health-analysis call merged with the locally computed ratios.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAnalysis {
    pub health_score: i32,
    pub credit_score: i32,
    pub debt_to_income_ratio: f64,
    pub credit_utilization: f64,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Complete {
        health: HealthAnalysis,
        investments: Vec<InvestmentRecommendation>,
    },
    PartialMissingInvestments {
        health: HealthAnalysis,
        reason: String,
    },
}

impl AnalysisOutcome {
    pub fn health(&self) -> &HealthAnalysis {
        match self {
            AnalysisOutcome::Complete { health, .. } => health,
            AnalysisOutcome::PartialMissingInvestments { health, .. } => health,
        }
    }

    pub fn investments(&self) -> Option<&[InvestmentRecommendation]> {
        match self {
            AnalysisOutcome::Complete { investments, .. } => Some(investments),
            AnalysisOutcome::PartialMissingInvestments { .. } => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, AnalysisOutcome::PartialMissingInvestments { .. })
    }

    pub fn to_result(&self) -> AnalysisResult {
        let health = self.health().clone();
        AnalysisResult {
            health_score: health.health_score,
            credit_score: health.credit_score,
            debt_to_income_ratio: health.debt_to_income_ratio,
            credit_utilization: health.credit_utilization,
            insights: health.insights,
            recommendations: health.recommendations,
            investment_recommendations: self.investments().map(<[_]>::to_vec),
        }
    }
}

/// Flat response shape returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub health_score: i32,
    pub credit_score: i32,
    pub debt_to_income_ratio: f64,
    pub credit_utilization: f64,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investment_recommendations: Option<Vec<InvestmentRecommendation>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn key() -> AnalysisKey {
        AnalysisKey::new(Uuid::nil(), 3, 2026).unwrap()
    }

    fn full_fields() -> AnalysisFields {
        AnalysisFields {
            monthly_income: Some(2500.0),
            monthly_expenses: Some(1900.0),
            debt_amount: Some(1200.0),
            credit_score: Some(720),
            financial_score: Some(68),
            credit_utilization: Some(130.0),
            debt_to_income_ratio: Some(4.0),
            recommendations: None,
        }
    }

    #[test]
    fn rejects_out_of_range_month() {
        assert!(AnalysisKey::new(Uuid::nil(), 0, 2026).is_err());
        assert!(AnalysisKey::new(Uuid::nil(), 13, 2026).is_err());
        assert!(AnalysisKey::new(Uuid::nil(), 12, 2026).is_ok());
    }

    #[test]
    fn insert_derives_available_and_clamps_utilization() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let row = merge_fields(None, key(), &full_fields(), now).unwrap();
        assert_eq!(row.monthly_available, Some(600.0));
        assert_eq!(row.credit_utilization, Some(100.0));
        assert_eq!(row.created_at, now);
    }

    #[test]
    fn partial_fields_without_row_are_skipped() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        assert!(merge_fields(None, key(), &AnalysisFields::expenses_only(50.0), now).is_none());
    }

    #[test]
    fn partial_update_keeps_other_columns_and_recomputes_available() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap();
        let row = merge_fields(None, key(), &full_fields(), t0).unwrap();
        let updated =
            merge_fields(Some(&row), key(), &AnalysisFields::expenses_only(2600.0), t1).unwrap();
        assert_eq!(updated.id, row.id);
        assert_eq!(updated.monthly_income, 2500.0);
        assert_eq!(updated.monthly_expenses, 2600.0);
        assert_eq!(updated.monthly_available, Some(-100.0));
        assert_eq!(updated.financial_score, 68);
        assert_eq!(updated.created_at, t0);
        assert_eq!(updated.updated_at, t1);
    }

    #[test]
    fn suggestions_accept_strings_and_objects() {
        let v = json!({
            "category": "Index funds",
            "riskLevel": "Medium",
            "timeHorizon": "5+ years",
            "reasoning": "Broad diversification",
            "suggestions": ["VTI", {"name": "Vanguard S&P 500", "symbol": "VOO"}]
        });
        let rec: InvestmentRecommendation = serde_json::from_value(v).unwrap();
        assert_eq!(rec.risk_level, RiskLevel::Medium);
        assert_eq!(rec.suggestions[0], Suggestion::Text("VTI".to_string()));
        match &rec.suggestions[1] {
            Suggestion::Structured(s) => assert_eq!(s.symbol.as_deref(), Some("VOO")),
            other => panic!("unexpected suggestion: {other:?}"),
        }
    }

    #[test]
    fn partial_outcome_omits_investments_in_result() {
        let health = HealthAnalysis {
            health_score: 70,
            credit_score: 700,
            debt_to_income_ratio: 4.0,
            credit_utilization: 24.0,
            insights: vec!["i".into()],
            recommendations: vec!["r".into()],
        };
        let outcome = AnalysisOutcome::PartialMissingInvestments {
            health,
            reason: "timeout".into(),
        };
        let v = serde_json::to_value(outcome.to_result()).unwrap();
        assert_eq!(v["healthScore"], 70);
        assert!(v.get("investmentRecommendations").is_none());
    }
}
