use crate::error::ApiError;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use finscope_core::aggregator::RecommendationAggregator;
use finscope_core::auth::{AuthClient, AuthUser};
use finscope_core::llm::LlmClient;
use finscope_core::market::QuoteProvider;
use finscope_core::receipts::{ReceiptPipeline, VisionReceiptExtractor};
use finscope_core::storage::object::ObjectStore;
use finscope_core::storage::{AnalysisStore, PgStore};
use std::sync::Arc;

/// Shared services. A `None` service failed to initialise; routes that need it answer 503.
#[derive(Clone)]
pub struct AppState {
    pub store: Option<PgStore>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub objects: Option<Arc<dyn ObjectStore>>,
    pub auth: Option<AuthClient>,
    pub quotes: Arc<dyn QuoteProvider>,
}

impl AppState {
    pub fn store(&self) -> Result<&PgStore, ApiError> {
        self.store.as_ref().ok_or(ApiError::Unavailable("database"))
    }

    pub fn llm(&self) -> Result<Arc<dyn LlmClient>, ApiError> {
        self.llm.clone().ok_or(ApiError::Unavailable("AI gateway"))
    }

    pub fn objects(&self) -> Result<Arc<dyn ObjectStore>, ApiError> {
        self.objects
            .clone()
            .ok_or(ApiError::Unavailable("receipt storage"))
    }

    pub fn aggregator(&self) -> Result<RecommendationAggregator, ApiError> {
        let store = self
            .store
            .clone()
            .map(|s| Arc::new(s) as Arc<dyn AnalysisStore>);
        Ok(RecommendationAggregator::new(self.llm()?, store))
    }

    pub fn extractor(&self) -> Result<VisionReceiptExtractor, ApiError> {
        Ok(VisionReceiptExtractor::new(self.llm()?, self.objects()?))
    }

    pub fn receipt_pipeline(&self) -> Result<ReceiptPipeline, ApiError> {
        let store = Arc::new(self.store()?.clone());
        Ok(ReceiptPipeline::new(
            self.objects()?,
            store.clone(),
            store,
            Arc::new(self.extractor()?),
        ))
    }

    /// The caller behind the bearer token, if one was sent. A token that does not resolve to a
    /// user is rejected rather than treated as anonymous.
    pub async fn current_user(&self, headers: &HeaderMap) -> Result<Option<AuthUser>, ApiError> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };
        let auth = self.auth.as_ref().ok_or(ApiError::Unavailable("auth"))?;
        match auth.get_user(token).await? {
            Some(user) => Ok(Some(user)),
            None => Err(ApiError::Unauthorized),
        }
    }

    pub async fn require_user(&self, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
        self.current_user(headers)
            .await?
            .ok_or(ApiError::Unauthorized)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}
