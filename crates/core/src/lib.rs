pub mod aggregator;
pub mod auth;
pub mod compare;
pub mod domain;
pub mod llm;
pub mod market;
pub mod metrics;
pub mod receipts;
pub mod storage;
pub mod support;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub supabase_url: Option<String>,
        pub supabase_service_role_key: Option<String>,
        pub supabase_anon_key: Option<String>,
        pub llm_gateway_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub receipts_bucket: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                supabase_url: std::env::var("SUPABASE_URL").ok(),
                supabase_service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
                supabase_anon_key: std::env::var("SUPABASE_ANON_KEY").ok(),
                llm_gateway_api_key: std::env::var("LLM_GATEWAY_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                receipts_bucket: std::env::var("RECEIPTS_BUCKET")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "receipts".to_string()),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_supabase_url(&self) -> anyhow::Result<&str> {
            self.supabase_url
                .as_deref()
                .context("SUPABASE_URL is required")
        }

        pub fn require_supabase_service_role_key(&self) -> anyhow::Result<&str> {
            self.supabase_service_role_key
                .as_deref()
                .context("SUPABASE_SERVICE_ROLE_KEY is required")
        }

        /// Key sent as `apikey` on auth calls; falls back to the service-role key.
        pub fn require_supabase_api_key(&self) -> anyhow::Result<&str> {
            self.supabase_anon_key
                .as_deref()
                .or(self.supabase_service_role_key.as_deref())
                .context("SUPABASE_ANON_KEY or SUPABASE_SERVICE_ROLE_KEY is required")
        }

        pub fn require_llm_gateway_api_key(&self) -> anyhow::Result<&str> {
            self.llm_gateway_api_key
                .as_deref()
                .context("LLM_GATEWAY_API_KEY is required")
        }
    }
}
