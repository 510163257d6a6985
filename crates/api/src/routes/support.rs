use axum::extract::State;
use axum::Json;
use finscope_core::support::{support_reply, SupportChatRequest, SupportReply};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<SupportChatRequest>,
) -> Result<Json<SupportReply>, ApiError> {
    let llm = state.llm()?;
    Ok(Json(support_reply(llm.as_ref(), req).await?))
}
