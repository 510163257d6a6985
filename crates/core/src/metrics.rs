//! Derived ratios computed from the figures a user enters on the analysis form.
//!
//! The formulas are kept exactly as the product has always reported them, including two
//! heuristics that look odd in isolation: the debt-to-income ratio divides total debt by
//! *annualised* income, and without a credit score the utilisation assumes a credit limit of
//! twice the monthly income. With a credit score the limit is a notional £5,000.

use crate::domain::validation::ValidationError;
use serde::{Deserialize, Serialize};

const NOTIONAL_CREDIT_LIMIT: f64 = 5000.0;

/// A form field as submitted: either a JSON number or the raw text of an input box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormNumber {
    Number(f64),
    Text(String),
}

impl FormNumber {
    pub(crate) fn parse(&self, field: &str) -> Result<Option<f64>, ValidationError> {
        let value = match self {
            FormNumber::Number(n) => *n,
            FormNumber::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                s.parse::<f64>()
                    .map_err(|_| ValidationError::new(field, format!("'{s}' is not a number")))?
            }
        };
        if !value.is_finite() {
            return Err(ValidationError::new(field, "must be a finite number"));
        }
        Ok(Some(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialForm {
    pub income: FormNumber,
    pub expenses: FormNumber,
    pub debt: FormNumber,
    #[serde(default)]
    pub credit_score: Option<FormNumber>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinancialInputs {
    pub income: f64,
    pub expenses: f64,
    pub debt: f64,
    pub credit_score: Option<f64>,
}

impl FinancialInputs {
    pub fn from_form(form: &FinancialForm) -> Result<Self, ValidationError> {
        let income = required(&form.income, "income")?;
        let expenses = required(&form.expenses, "expenses")?;
        let debt = required(&form.debt, "debt")?;

        // A blank or zero score counts as not supplied.
        let credit_score = match &form.credit_score {
            Some(v) => v.parse("creditScore")?.filter(|s| *s != 0.0),
            None => None,
        };
        if let Some(score) = credit_score {
            if score < 0.0 {
                return Err(ValidationError::new("creditScore", "must not be negative"));
            }
        }

        Ok(Self {
            income,
            expenses,
            debt,
            credit_score,
        })
    }
}

pub(crate) fn required(value: &FormNumber, field: &str) -> Result<f64, ValidationError> {
    let v = value
        .parse(field)?
        .ok_or_else(|| ValidationError::new(field, "is required"))?;
    if v < 0.0 {
        return Err(ValidationError::new(field, "must not be negative"));
    }
    Ok(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialMetrics {
    pub income: f64,
    pub expenses: f64,
    pub debt: f64,
    pub credit_score: Option<f64>,
    pub disposable_income: f64,
    pub debt_to_income_ratio: f64,
    pub credit_utilization: f64,
}

/// Pure: identical inputs always produce identical outputs. Zero income yields non-finite
/// ratios rather than an error.
pub fn compute_metrics(inputs: &FinancialInputs) -> FinancialMetrics {
    let FinancialInputs {
        income,
        expenses,
        debt,
        credit_score,
    } = *inputs;

    let disposable_income = income - expenses;
    let debt_to_income_ratio = round_to_tenth((debt / (income * 12.0)) * 100.0);
    let credit_utilization = match credit_score {
        Some(_) => round_to_tenth(((debt / NOTIONAL_CREDIT_LIMIT) * 100.0).min(100.0)),
        None => round_to_tenth((debt / (income * 2.0)) * 100.0),
    };

    FinancialMetrics {
        income,
        expenses,
        debt,
        credit_score,
        disposable_income,
        debt_to_income_ratio,
        credit_utilization,
    }
}

/// Rounds to one decimal place from the exact binary value. An exact tie goes to the larger
/// magnitude, so 0.25 becomes 0.3 while 0.35 (stored as 0.34999...) becomes 0.3.
pub fn round_to_tenth(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }

    // Every finite f64 has a terminating expansion of at most 1074 fraction digits.
    let exact = format!("{:.1074}", value.abs());
    let (int_part, frac) = exact.split_once('.').unwrap_or((exact.as_str(), ""));
    let mut frac = frac.bytes();
    let tenths = frac.next().unwrap_or(b'0');
    let round_up = frac.next().is_some_and(|d| d >= b'5');

    let mut digits: Vec<u8> = int_part.bytes().chain(std::iter::once(tenths)).collect();
    if round_up {
        increment_decimal(&mut digits);
    }
    let split = digits.len() - 1;
    let text = format!(
        "{}.{}",
        String::from_utf8_lossy(&digits[..split]),
        String::from_utf8_lossy(&digits[split..])
    );
    let magnitude = text.parse::<f64>().unwrap_or(value.abs());
    if value.is_sign_negative() {
        -magnitude
    } else {
        magnitude
    }
}

fn increment_decimal(digits: &mut Vec<u8>) {
    for d in digits.iter_mut().rev() {
        if *d == b'9' {
            *d = b'0';
        } else {
            *d += 1;
            return;
        }
    }
    digits.insert(0, b'1');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(income: f64, expenses: f64, debt: f64, credit_score: Option<f64>) -> FinancialInputs {
        FinancialInputs {
            income,
            expenses,
            debt,
            credit_score,
        }
    }

    #[test]
    fn reference_household_with_credit_score() {
        let m = compute_metrics(&inputs(2500.0, 1900.0, 1200.0, Some(720.0)));
        assert_eq!(m.disposable_income, 600.0);
        assert_eq!(m.debt_to_income_ratio, 4.0);
        assert_eq!(m.credit_utilization, 24.0);
    }

    #[test]
    fn utilization_clamps_at_one_hundred_with_credit_score() {
        let m = compute_metrics(&inputs(2500.0, 1900.0, 6000.0, Some(720.0)));
        assert_eq!(m.credit_utilization, 100.0);
        assert_eq!(m.debt_to_income_ratio, 20.0);
    }

    #[test]
    fn fallback_utilization_uses_twice_income_and_is_unclamped() {
        let m = compute_metrics(&inputs(2500.0, 1900.0, 1200.0, None));
        assert_eq!(m.credit_utilization, 24.0);

        let m = compute_metrics(&inputs(1000.0, 900.0, 5000.0, None));
        assert_eq!(m.credit_utilization, 250.0);
    }

    #[test]
    fn disposable_income_can_be_negative() {
        let m = compute_metrics(&inputs(1800.0, 2250.5, 0.0, None));
        assert_eq!(m.disposable_income, 1800.0 - 2250.5);
    }

    #[test]
    fn dti_rounds_to_one_decimal() {
        // 1000 / 36000 * 100 = 2.777...
        let m = compute_metrics(&inputs(3000.0, 0.0, 1000.0, None));
        assert_eq!(m.debt_to_income_ratio, 2.8);
    }

    #[test]
    fn exact_ties_round_away_from_zero() {
        assert_eq!(round_to_tenth(0.25), 0.3);
        assert_eq!(round_to_tenth(1.25), 1.3);
        assert_eq!(round_to_tenth(2.25), 2.3);
        assert_eq!(round_to_tenth(12.5 / 5000.0 * 100.0), 0.3);
        assert_eq!(round_to_tenth(-0.25), -0.3);
        assert_eq!(round_to_tenth(9.95), 9.9);
        assert_eq!(round_to_tenth(99.96), 100.0);
    }

    #[test]
    fn near_ties_follow_the_stored_binary_value() {
        // 0.35 is stored just below the tie, 1.05 just above it.
        assert_eq!(round_to_tenth(0.35), 0.3);
        assert_eq!(round_to_tenth(1.05), 1.1);
        assert_eq!(round_to_tenth(2.7777777777777777), 2.8);
        assert_eq!(round_to_tenth(7.0), 7.0);
    }

    #[test]
    fn tie_values_from_the_formulas_round_up() {
        // 45 / 2000 * 100 = 2.25 exactly.
        let m = compute_metrics(&inputs(1000.0, 0.0, 45.0, None));
        assert_eq!(m.credit_utilization, 2.3);

        // 12.5 / 5000 * 100 = 0.25 with a credit score.
        let m = compute_metrics(&inputs(1000.0, 0.0, 12.5, Some(700.0)));
        assert_eq!(m.credit_utilization, 0.3);

        // 30 / 12000 * 100 = 0.25.
        let m = compute_metrics(&inputs(1000.0, 0.0, 30.0, Some(700.0)));
        assert_eq!(m.debt_to_income_ratio, 0.3);
    }

    #[test]
    fn zero_income_produces_non_finite_ratios() {
        let m = compute_metrics(&inputs(0.0, 100.0, 500.0, None));
        assert!(m.debt_to_income_ratio.is_infinite());
        assert!(m.credit_utilization.is_infinite());
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let i = inputs(4200.0, 3100.0, 8800.0, Some(690.0));
        assert_eq!(compute_metrics(&i), compute_metrics(&i));
    }

    #[test]
    fn form_accepts_text_and_numbers() {
        let form: FinancialForm = serde_json::from_value(json!({
            "income": "2500",
            "expenses": 1900,
            "debt": " 1200 ",
            "creditScore": ""
        }))
        .unwrap();
        let i = FinancialInputs::from_form(&form).unwrap();
        assert_eq!(i, inputs(2500.0, 1900.0, 1200.0, None));
    }

    #[test]
    fn form_treats_zero_credit_score_as_absent() {
        let form: FinancialForm = serde_json::from_value(json!({
            "income": "2500", "expenses": "1900", "debt": "0", "creditScore": "0"
        }))
        .unwrap();
        assert_eq!(FinancialInputs::from_form(&form).unwrap().credit_score, None);
    }

    #[test]
    fn form_rejects_missing_and_non_numeric_fields() {
        let form: FinancialForm = serde_json::from_value(json!({
            "income": "", "expenses": "1900", "debt": "0"
        }))
        .unwrap();
        let err = FinancialInputs::from_form(&form).unwrap_err();
        assert_eq!(err.field, "income");

        let form: FinancialForm = serde_json::from_value(json!({
            "income": "2500", "expenses": "lots", "debt": "0"
        }))
        .unwrap();
        assert_eq!(FinancialInputs::from_form(&form).unwrap_err().field, "expenses");
    }
}
