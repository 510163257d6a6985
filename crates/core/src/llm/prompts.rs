use crate::domain::analysis::MonthlySummary;
use crate::llm::ToolSpec;
use crate::metrics::FinancialMetrics;
use serde_json::json;

pub const TOOL_EMIT_HEALTH_ANALYSIS: &str = "emit_health_analysis";
pub const TOOL_EMIT_INVESTMENTS: &str = "emit_investment_recommendations";
pub const TOOL_EXTRACT_RECEIPT: &str = "extract_receipt_data";
pub const TOOL_EMIT_COMPARISON: &str = "emit_investment_comparison";

pub fn health_system_prompt() -> String {
    [
        "You are a financial advisor AI. Provide clear, actionable advice.",
        "Always respond with valid JSON only, no markdown formatting.",
    ]
    .join("\n")
}

pub fn health_user_prompt(metrics: &FinancialMetrics, history: &[MonthlySummary]) -> String {
    let mut out = format!(
        "Analyze this financial situation and provide insights:\n\n\
Monthly Income: £{}\n\
Monthly Expenses: £{}\n\
Total Debt: £{}\n",
        metrics.income, metrics.expenses, metrics.debt
    );
    if let Some(score) = metrics.credit_score {
        out.push_str(&format!("Credit Score: {score}\n"));
    }
    out.push_str(&format!(
        "\nDisposable Income: £{}\n\
Debt-to-Income Ratio: {:.1}%\n\
Credit Utilization: {:.1}%\n",
        metrics.disposable_income, metrics.debt_to_income_ratio, metrics.credit_utilization
    ));

    if !history.is_empty() {
        out.push_str("\nPrevious months (newest first):\n");
        for m in history {
            out.push_str(&format!(
                "- {:04}-{:02}: income £{}, expenses £{}, debt £{}, health score {}, credit score {}\n",
                m.year,
                m.month,
                m.monthly_income,
                m.monthly_expenses,
                m.debt_amount,
                m.financial_score,
                m.credit_score
            ));
        }
        out.push_str("Comment on the trend where it is meaningful.\n");
    }

    out.push_str(
        "\nProvide:\n\
1. A financial health score (0-100)\n\
2. An estimated credit score if not provided (or validate the provided one)\n\
3. 3-4 key insights about their financial situation\n\
4. 3-4 specific, actionable recommendations to improve their financial health\n\n\
Format your response as JSON with this structure:\n\
{\n  \"healthScore\": number,\n  \"estimatedCreditScore\": number,\n  \"insights\": [string],\n  \"recommendations\": [string]\n}",
    );
    out
}

pub fn health_tool() -> ToolSpec {
    ToolSpec {
        name: TOOL_EMIT_HEALTH_ANALYSIS,
        description: "Emit the financial health analysis as structured JSON",
        parameters: json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["healthScore", "estimatedCreditScore", "insights", "recommendations"],
            "properties": {
                "healthScore": {"type": "number", "minimum": 0, "maximum": 100},
                "estimatedCreditScore": {"type": "number"},
                "insights": {"type": "array", "items": {"type": "string"}},
                "recommendations": {"type": "array", "items": {"type": "string"}}
            }
        }),
    }
}

pub fn investments_system_prompt() -> String {
    [
        "You are an investment advisor AI. Provide balanced, realistic advice about investments.",
        "Base recommendations on the person's financial health, risk capacity and timeframe.",
        "Always respond with valid JSON only, no markdown formatting.",
    ]
    .join("\n")
}

pub fn investments_user_prompt(
    metrics: &FinancialMetrics,
    health_score: i32,
    credit_score: i32,
) -> String {
    let focus = if metrics.disposable_income <= 0.0 {
        "This person has no money left over each month. Do not recommend market investments as the \
priority: focus the categories on building an emergency fund, cutting expenses and reducing \
debt, and keep any investment category low risk."
    } else {
        "Recommend 3-4 investment categories suited to the monthly surplus, mixing time horizons \
and risk levels appropriate to their health score."
    };

    format!(
        "Financial profile:\n\
Monthly Income: £{}\n\
Monthly Expenses: £{}\n\
Disposable Income: £{}\n\
Total Debt: £{}\n\
Debt-to-Income Ratio: {:.1}%\n\
Credit Utilization: {:.1}%\n\
Financial Health Score: {health_score}/100\n\
Credit Score: {credit_score}\n\n\
{focus}\n\n\
Format your response as JSON with this structure:\n\
{{\n  \"recommendations\": [\n    {{\n      \"category\": string,\n      \"riskLevel\": \"low\" | \"medium\" | \"high\",\n      \"timeHorizon\": string,\n      \"reasoning\": string,\n      \"suggestions\": [string]\n    }}\n  ]\n}}",
        metrics.income,
        metrics.expenses,
        metrics.disposable_income,
        metrics.debt,
        metrics.debt_to_income_ratio,
        metrics.credit_utilization,
    )
}

pub fn investments_tool() -> ToolSpec {
    ToolSpec {
        name: TOOL_EMIT_INVESTMENTS,
        description: "Emit investment recommendation categories as structured JSON",
        parameters: json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["recommendations"],
            "properties": {
                "recommendations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["category", "riskLevel", "timeHorizon", "reasoning", "suggestions"],
                        "properties": {
                            "category": {"type": "string"},
                            "riskLevel": {"type": "string", "enum": ["low", "medium", "high"]},
                            "timeHorizon": {"type": "string"},
                            "reasoning": {"type": "string"},
                            "suggestions": {"type": "array", "items": {"type": "string"}}
                        }
                    }
                }
            }
        }),
    }
}

pub fn receipt_system_prompt() -> String {
    "You are a receipt data extraction assistant. Extract the total amount and a brief description \
from receipts. Return ONLY a JSON object with \"amount\" (number) and \"description\" (string, max \
100 chars). If you cannot find the amount, return amount as 0."
        .to_string()
}

pub fn receipt_user_prompt() -> String {
    "Extract the total amount and describe what this receipt is for. Return only JSON format: \
{\"amount\": number, \"description\": \"brief description\"}"
        .to_string()
}

pub fn receipt_tool() -> ToolSpec {
    ToolSpec {
        name: TOOL_EXTRACT_RECEIPT,
        description: "Extract receipt amount and description",
        parameters: json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["amount", "description"],
            "properties": {
                "amount": {"type": "number", "description": "Total amount on the receipt"},
                "description": {
                    "type": "string",
                    "description": "Brief description of what the receipt is for"
                }
            }
        }),
    }
}

pub fn support_system_prompt() -> String {
    [
        "You are the help assistant for FinScope, a personal finance and investing app.",
        "Help users find their way around these areas:",
        "- Dashboard: financial health score, monthly income, expenses, money left to save, debt, \
credit score and key ratios, with history over past months.",
        "- Analyze Finances: enter the month's figures for a health analysis, personalised \
recommendations and investment suggestions; upload receipts to track expenses.",
        "- Compare Investments: compare up to three investments side by side for a monthly amount, \
with risk, expected returns and a recommendation.",
        "- Portfolio: set up short-term (1-3 years) and long-term (5+ years) portfolios, choose a \
risk appetite (low, medium or high) for each, and see 5 to 8 recommended stocks and ETFs with \
live prices and daily changes, plus holdings, total value and profit/loss.",
        "- Trade Journal: record buy and sell trades with entry and exit prices and notes, and track \
P&L, win rate and open and closed positions.",
        "The app does recommend specific assets: they appear on the Portfolio page once a portfolio \
with a risk appetite is set up. Never say otherwise.",
        "Be friendly, accurate and concise, and point users to the right page for their question.",
    ]
    .join("\n")
}

pub fn comparison_system_prompt() -> String {
    [
        "You are an investment advisor AI. Provide balanced, realistic advice about investments.",
        "Always respond with valid JSON only, no markdown formatting.",
        "Base recommendations on risk tolerance and investment timeframe.",
    ]
    .join("\n")
}

pub fn comparison_user_prompt(investments: &[String], monthly_amount: f64) -> String {
    let list = investments
        .iter()
        .enumerate()
        .map(|(i, inv)| format!("{}. {inv}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Compare these investment options for someone who can invest £{monthly_amount} per month:\n\n\
{list}\n\n\
For each investment, provide:\n\
- Risk level (Low/Medium/High)\n\
- Expected annual return estimate\n\
- A brief recommendation explaining pros/cons\n\
- A suitability score (0-100) based on the monthly investment amount\n\n\
Then recommend the best choice overall and explain why.\n\n\
Format your response as JSON with this structure:\n\
{{\n  \"investments\": [\n    {{\n      \"name\": string,\n      \"risk\": string,\n      \"expectedReturn\": string,\n      \"recommendation\": string,\n      \"suitability\": number\n    }}\n  ],\n  \"bestChoice\": string,\n  \"reasoning\": string\n}}"
    )
}

pub fn comparison_tool() -> ToolSpec {
    ToolSpec {
        name: TOOL_EMIT_COMPARISON,
        description: "Emit the investment comparison as structured JSON",
        parameters: json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["investments", "bestChoice", "reasoning"],
            "properties": {
                "investments": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["name", "risk", "expectedReturn", "recommendation", "suitability"],
                        "properties": {
                            "name": {"type": "string"},
                            "risk": {"type": "string"},
                            "expectedReturn": {"type": "string"},
                            "recommendation": {"type": "string"},
                            "suitability": {"type": "number", "minimum": 0, "maximum": 100}
                        }
                    }
                },
                "bestChoice": {"type": "string"},
                "reasoning": {"type": "string"}
            }
        }),
    }
}
