//! Supabase Auth access and the process-wide session holder.

use crate::config::Settings;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user: AuthUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_supabase_url()?.to_string();
        let api_key = settings.require_supabase_api_key()?.to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build auth http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{path}", self.base_url.trim_end_matches('/'))
    }

    fn headers(&self, access_token: &str) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}"))
                .context("access token is not a valid header value")?,
        );
        Ok(headers)
    }

    /// Resolves the user behind `access_token`. An expired or unknown token yields `None`.
    pub async fn get_user(&self, access_token: &str) -> anyhow::Result<Option<AuthUser>> {
        let res = self
            .http
            .get(self.url("/user"))
            .headers(self.headers(access_token)?)
            .send()
            .await
            .context("auth user request failed")?;

        let status = res.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("auth user HTTP {status}: {body}");
        }

        let user = res
            .json::<AuthUser>()
            .await
            .context("failed to parse auth user response")?;
        Ok(Some(user))
    }

    pub async fn sign_out(&self, access_token: &str) -> anyhow::Result<()> {
        let res = self
            .http
            .post(self.url("/logout"))
            .headers(self.headers(access_token)?)
            .send()
            .await
            .context("auth logout request failed")?;

        let status = res.status();
        // A token that is already invalid is as good as signed out.
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        anyhow::bail!("auth logout HTTP {status}: {body}")
    }
}

pub type SubscriptionId = u64;

type Listener = Box<dyn Fn(&AuthEvent) + Send + Sync>;

/// Holds the signed-in session and notifies subscribers when it changes.
#[derive(Default)]
pub struct SessionContext {
    session: RwLock<Option<Session>>,
    listeners: Mutex<HashMap<SubscriptionId, Listener>>,
    next_id: AtomicU64,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.current().map(|s| s.user.id)
    }

    pub fn subscribe(&self, listener: impl Fn(&AuthEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Box::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    /// Replaces the session. Emits `SignedIn` for a new session and `SignedOut` when one is
    /// cleared; clearing an empty context emits nothing.
    pub fn set_session(&self, session: Option<Session>) {
        let event = {
            let mut current = self.session.write().unwrap_or_else(|e| e.into_inner());
            let event = match &session {
                Some(s) => Some(AuthEvent::SignedIn(s.clone())),
                None if current.is_some() => Some(AuthEvent::SignedOut),
                None => None,
            };
            *current = session;
            event
        };
        if let Some(event) = event {
            self.emit(&event);
        }
    }

    /// Validates `access_token` and installs the resulting session.
    pub async fn sign_in_with_token(
        &self,
        client: &AuthClient,
        access_token: &str,
    ) -> anyhow::Result<Session> {
        let user = client
            .get_user(access_token)
            .await?
            .context("access token is invalid or expired")?;
        let session = Session {
            access_token: access_token.to_string(),
            user,
        };
        tracing::info!(user_id = %session.user.id, "session established");
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Revokes the current token remotely, then clears the local session. The local session is
    /// cleared even when revocation fails.
    pub async fn sign_out(&self, client: &AuthClient) -> anyhow::Result<()> {
        let remote = match self.current() {
            Some(session) => client.sign_out(&session.access_token).await,
            None => Ok(()),
        };
        self.set_session(None);
        remote
    }

    fn emit(&self, event: &AuthEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.values() {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn session() -> Session {
        Session {
            access_token: "token".into(),
            user: AuthUser {
                id: Uuid::nil(),
                email: Some("me@example.com".into()),
            },
        }
    }

    fn recorder(ctx: &SessionContext) -> (SubscriptionId, Arc<Mutex<Vec<AuthEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = ctx.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        (id, seen)
    }

    #[test]
    fn emits_sign_in_and_sign_out() {
        let ctx = SessionContext::new();
        let (_, seen) = recorder(&ctx);

        ctx.set_session(Some(session()));
        assert_eq!(ctx.user_id(), Some(Uuid::nil()));
        ctx.set_session(None);
        ctx.set_session(None);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![AuthEvent::SignedIn(session()), AuthEvent::SignedOut]
        );
        assert!(ctx.current().is_none());
    }

    #[test]
    fn unsubscribed_listeners_stop_receiving() {
        let ctx = SessionContext::new();
        let (first, first_seen) = recorder(&ctx);
        let (_, second_seen) = recorder(&ctx);

        assert!(ctx.unsubscribe(first));
        assert!(!ctx.unsubscribe(first));
        ctx.set_session(Some(session()));

        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(second_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn parses_supabase_user_payload() {
        let user: AuthUser = serde_json::from_value(serde_json::json!({
            "id": "00000000-0000-0000-0000-000000000000",
            "aud": "authenticated",
            "email": "me@example.com",
            "app_metadata": {"provider": "email"}
        }))
        .unwrap();
        assert_eq!(user.id, Uuid::nil());
        assert_eq!(user.email.as_deref(), Some("me@example.com"));
    }

    #[test]
    fn auth_urls_are_rooted_at_auth_v1() {
        let client = AuthClient {
            http: reqwest::Client::new(),
            base_url: "https://proj.supabase.co/".into(),
            api_key: "anon".into(),
        };
        assert_eq!(client.url("/user"), "https://proj.supabase.co/auth/v1/user");
        let headers = client.headers("abc").unwrap();
        assert_eq!(headers["authorization"], "Bearer abc");
        assert_eq!(headers["apikey"], "anon");
    }
}
