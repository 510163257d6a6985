use crate::domain::contract::LlmReceiptExtraction;
use crate::domain::receipt::ExtractedReceipt;
use crate::llm::json::parse_tool_call;
use crate::llm::{prompts, GenerateRequest, InlineImage, LlmClient};
use crate::storage::object::{content_type_for, ObjectStore};
use anyhow::Context;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait ReceiptExtractor: Send + Sync {
    /// Reads the stored image at `file_path` and returns its total and a short description.
    /// `content_type` is the type the image was uploaded with, when known.
    async fn extract(
        &self,
        file_path: &str,
        content_type: Option<&str>,
    ) -> anyhow::Result<ExtractedReceipt>;
}

/// Sends the stored receipt image inline to a vision-capable model with a forced
/// `extract_receipt_data` tool call.
#[derive(Clone)]
pub struct VisionReceiptExtractor {
    llm: Arc<dyn LlmClient>,
    objects: Arc<dyn ObjectStore>,
}

impl VisionReceiptExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { llm, objects }
    }
}

#[async_trait::async_trait]
impl ReceiptExtractor for VisionReceiptExtractor {
    async fn extract(
        &self,
        file_path: &str,
        content_type: Option<&str>,
    ) -> anyhow::Result<ExtractedReceipt> {
        let bytes = self
            .objects
            .download(file_path)
            .await
            .with_context(|| format!("failed to download receipt image {file_path}"))?;

        let request = GenerateRequest::text(
            prompts::receipt_system_prompt(),
            prompts::receipt_user_prompt(),
        )
        .with_image(InlineImage {
            mime_type: image_mime_type(file_path, content_type).to_string(),
            bytes,
        })
        .with_tool(prompts::receipt_tool());

        let generation = self
            .llm
            .generate(request)
            .await
            .context("receipt extraction call failed")?;
        let parsed: LlmReceiptExtraction =
            parse_tool_call(&generation, prompts::TOOL_EXTRACT_RECEIPT)?;
        parsed.validate_and_into_receipt()
    }
}

/// The image type sent to the model: the uploaded type when it is an image, else a guess from
/// the extension, else JPEG.
fn image_mime_type<'a>(file_path: &str, content_type: Option<&'a str>) -> &'a str {
    if let Some(ct) = content_type.map(str::trim) {
        if ct.to_ascii_lowercase().starts_with("image/") {
            return ct;
        }
    }
    match content_type_for(file_path) {
        guessed if guessed.starts_with("image/") => guessed,
        _ => "image/jpeg",
    }
}
