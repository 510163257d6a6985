pub mod analysis;
pub mod market;
pub mod receipts;
pub mod support;
pub mod trades;

use chrono::Utc;
use finscope_core::domain::validation::ValidationError;
use finscope_core::time::resolve_period;

use crate::error::ApiError;

/// Explicit month/year from a request, or the current UTC month when both are missing.
/// Supplying only one of the two is rejected.
pub(crate) fn period_or_current(
    month: Option<u32>,
    year: Option<i32>,
) -> Result<(u32, i32), ApiError> {
    match (month, year) {
        (Some(m), Some(y)) => Ok((m, y)),
        (None, None) => Ok(resolve_period(None, Utc::now())?),
        (Some(_), None) => Err(ValidationError::new("year", "is required when month is given").into()),
        (None, Some(_)) => Err(ValidationError::new("month", "is required when year is given").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn explicit_period_is_used_as_given() {
        assert_eq!(period_or_current(Some(3), Some(2026)).unwrap(), (3, 2026));
    }

    #[test]
    fn missing_period_defaults_to_current_month() {
        let (month, _) = period_or_current(None, None).unwrap();
        assert!((1..=12).contains(&month));
    }

    #[test]
    fn half_a_period_is_a_bad_request() {
        for (month, year) in [(Some(3), None), (None, Some(2026))] {
            let err = period_or_current(month, year).unwrap_err();
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }
}
