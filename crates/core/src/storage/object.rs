use crate::config::Settings;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()>;

    async fn download(&self, path: &str) -> anyhow::Result<Vec<u8>>;

    async fn remove(&self, paths: &[String]) -> anyhow::Result<()>;
}

/// Supabase Storage REST client, authenticated with the service-role key.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_supabase_url()?.to_string();
        let service_key = settings.require_supabase_service_role_key()?.to_string();

        let timeout_secs = std::env::var("STORAGE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build storage http client")?;

        Ok(Self {
            http,
            base_url,
            service_key,
            bucket: settings.receipts_bucket.clone(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.service_key)?);
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))?,
        );
        Ok(headers)
    }
}

async fn ensure_success(res: reqwest::Response, op: &str) -> anyhow::Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    anyhow::bail!("storage {op} failed: HTTP {status}: {body}")
}

#[async_trait::async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        let mut headers = self.headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        headers.insert("x-upsert", HeaderValue::from_static("false"));

        let res = self
            .http
            .post(self.object_url(path))
            .headers(headers)
            .body(bytes)
            .send()
            .await
            .context("storage upload request failed")?;
        ensure_success(res, "upload").await?;
        Ok(())
    }

    async fn download(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let res = self
            .http
            .get(self.object_url(path))
            .headers(self.headers()?)
            .send()
            .await
            .context("storage download request failed")?;
        let res = ensure_success(res, "download").await?;
        let bytes = res
            .bytes()
            .await
            .context("failed to read storage download body")?;
        Ok(bytes.to_vec())
    }

    async fn remove(&self, paths: &[String]) -> anyhow::Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/storage/v1/object/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket
        );
        let res = self
            .http
            .delete(url)
            .headers(self.headers()?)
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await
            .context("storage remove request failed")?;
        ensure_success(res, "remove").await?;
        Ok(())
    }
}

/// Guesses an image content type from a file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
