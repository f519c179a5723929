// # MangaDex Content Source
//
// This crate provides the MangaDex implementation of the mangasync
// `ContentSource` trait.
//
// ## Session Lifecycle
//
// - Login happens lazily, on the first call that needs a session
// - The session and refresh tokens live behind a single-writer lock
// - On a 401 the client refreshes once and retries once; a failed refresh
//   falls back to a full login
// - Concurrent callers that hit the same expired session refresh it only
//   once: a refresh is skipped when another task already replaced the token
// - A 429 gets one fixed backoff (MangaDex locks accounts out for a long
//   window, default 20 minutes) and one retry
//
// ## Security Requirements
//
// - Password and tokens NEVER appear in logs or `Debug` output
// - Credentials MUST be provided via environment variables only
//
// ## API Reference
//
// - Login: POST `/auth/login`
// - Refresh: POST `/auth/refresh`
// - Followed works: GET `/manga/status`
// - Work detail: GET `/manga/:id?includes[]=cover_art`
// - Latest chapter: GET `/chapter?manga=:id&order[chapter]=desc&translatedLanguage[]=en&limit=1`

use async_trait::async_trait;
use chrono::DateTime;
use mangasync_core::config::ContentApiConfig;
use mangasync_core::model::{Status, parse_release};
use mangasync_core::recovery::RecoveryPolicy;
use mangasync_core::traits::{ContentSource, Release, SourceDetail, Subscription};
use mangasync_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// MangaDex API base URL
pub const MANGADEX_API_BASE: &str = "https://api.mangadex.org";

/// Public title page prefix; catalog links are `{prefix}/{id}`
pub const MANGADEX_TITLE_BASE: &str = "https://mangadex.org/title";

/// Cover image host
pub const MANGADEX_COVER_BASE: &str = "https://uploads.mangadex.org/covers";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Title languages in order of preference
const TITLE_PREFERENCE: [&str; 4] = ["ja-ro", "ja", "jp", "en"];

/// Map a MangaDex reading status onto a status tag
///
/// Unknown statuses are treated as planned.
pub fn map_reading_status(status: &str) -> Status {
    match status {
        "reading" | "re_reading" => Status::Reading,
        "completed" => Status::Completed,
        "on_hold" => Status::OnHold,
        "dropped" => Status::Dropped,
        _ => Status::PlanningToRead,
    }
}

/// Catalog link of a MangaDex work
pub fn title_link(id: &str) -> String {
    format!("{}/{}", MANGADEX_TITLE_BASE, id)
}

#[derive(Clone)]
struct Session {
    session: String,
    refresh: String,
}

/// MangaDex content source
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the password or
/// session tokens.
pub struct MangaDexClient {
    /// Account username
    username: String,

    /// Account password
    /// ⚠️ NEVER log this value
    password: String,

    /// API base URL, overridable for tests
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Current session; `None` until the first login
    /// ⚠️ NEVER log this value
    session: RwLock<Option<Session>>,

    /// Single-retry recovery for 401 and 429
    recovery: RecoveryPolicy,
}

// Custom Debug implementation that hides credentials
impl std::fmt::Debug for MangaDexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MangaDexClient")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("session", &"<REDACTED>")
            .field("recovery", &self.recovery)
            .finish()
    }
}

impl MangaDexClient {
    /// Create a new MangaDex client
    ///
    /// No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if credentials are missing or the HTTP
    /// client cannot be built.
    pub fn new(config: &ContentApiConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            username: config.username.clone(),
            password: config.password.clone(),
            base_url: MANGADEX_API_BASE.to_string(),
            client,
            session: RwLock::new(None),
            recovery: RecoveryPolicy::new(config.rate_limit_backoff()),
        })
    }

    /// Point the client at a different API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Log in with username and password, replacing any current session
    pub async fn login(&self) -> Result<()> {
        let mut session = self.session.write().await;
        *session = Some(self.request_login().await?);
        Ok(())
    }

    async fn request_login(&self) -> Result<Session> {
        tracing::info!("Logging in to MangaDex as {}", self.username);

        let url = format!("{}/auth/login", self.base_url);
        let body = json!({ "username": self.username, "password": self.password });

        let auth: AuthResponse = self
            .recovery
            .call("MangaDex login", || self.post_auth(&url, &body, "login"))
            .await?;

        Ok(Session {
            session: auth.token.session,
            refresh: auth.token.refresh.unwrap_or_default(),
        })
    }

    /// Replace a rejected session token
    ///
    /// Does nothing if the current token is no longer `stale`: another task
    /// already replaced it.
    async fn reauthenticate(&self, stale: &str) -> Result<()> {
        let mut guard = self.session.write().await;

        let refresh_token = match guard.as_ref() {
            Some(current) if current.session != stale => return Ok(()),
            Some(current) => current.refresh.clone(),
            None => String::new(),
        };

        if !refresh_token.is_empty() {
            tracing::info!("Refreshing MangaDex session");
            let url = format!("{}/auth/refresh", self.base_url);
            let body = json!({ "token": refresh_token });

            match self.post_auth::<AuthResponse>(&url, &body, "refresh").await {
                Ok(auth) => {
                    *guard = Some(Session {
                        session: auth.token.session,
                        refresh: auth.token.refresh.unwrap_or(refresh_token),
                    });
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("MangaDex session refresh failed, logging in again: {}", e);
                }
            }
        }

        *guard = Some(self.request_login().await?);
        Ok(())
    }

    /// Current session token, logging in on first use
    async fn session_token(&self) -> Result<String> {
        if let Some(ref session) = *self.session.read().await {
            return Ok(session.session.clone());
        }

        let mut guard = self.session.write().await;
        if let Some(ref session) = *guard {
            return Ok(session.session.clone());
        }
        let session = self.request_login().await?;
        let token = session.session.clone();
        *guard = Some(session);
        Ok(token)
    }

    async fn post_auth<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
        context: &str,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::network(format!("{}: HTTP request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(match status.as_u16() {
                429 => Error::from_status(429, context, error_text),
                code => Error::auth(format!("{}: rejected with status {}: {}", context, code, error_text)),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::decode(format!("{}: failed to parse response: {}", context, e)))
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        token: &str,
        context: &str,
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::network(format!("{}: HTTP request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Error::from_status(status.as_u16(), context, error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::decode(format!("{}: failed to parse response: {}", context, e)))
    }

    /// Authorized GET with session recovery and rate-limit backoff
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let url = url.as_str();
        // Token sent by the latest attempt, so a refresh can tell whether
        // another task already replaced it
        let used_token = std::sync::Mutex::new(String::new());
        let used_token = &used_token;

        self.recovery
            .call_with_reauth(
                context,
                || async move {
                    let token = self.session_token().await?;
                    if let Ok(mut used) = used_token.lock() {
                        used.clone_from(&token);
                    }
                    self.get_once(url, query, &token, context).await
                },
                || async move {
                    let stale = used_token
                        .lock()
                        .map(|used| used.clone())
                        .unwrap_or_default();
                    self.reauthenticate(&stale).await
                },
            )
            .await
    }
}

#[async_trait]
impl ContentSource for MangaDexClient {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let response: StatusResponse = self.get("/manga/status", &[], "manga status").await?;

        tracing::info!("MangaDex reports {} followed work(s)", response.statuses.len());

        Ok(response
            .statuses
            .into_iter()
            .map(|(external_id, status)| Subscription {
                status: map_reading_status(&status),
                external_id,
            })
            .collect())
    }

    async fn fetch_detail(&self, external_id: &str) -> Result<SourceDetail> {
        let path = format!("/manga/{}", external_id);
        let response: MangaResponse = self
            .get(&path, &[("includes[]", "cover_art")], "manga detail")
            .await?;

        let manga = response.data;
        let title = manga.attributes.preferred_title().ok_or_else(|| {
            Error::decode(format!("manga detail: {} has no title", external_id))
        })?;

        let art_url = manga
            .relationships
            .iter()
            .find(|relation| relation.kind == "cover_art")
            .and_then(|relation| relation.attributes.as_ref())
            .and_then(|attributes| attributes.file_name.as_deref())
            .map(|file_name| format!("{}/{}/{}.512.jpg", MANGADEX_COVER_BASE, manga.id, file_name));

        tracing::debug!("Fetched MangaDex detail for {} ({})", title, manga.id);

        Ok(SourceDetail {
            source_link: title_link(&manga.id),
            external_id: manga.id,
            title,
            art_url,
            last_chapter: manga.attributes.last_chapter,
        })
    }

    async fn latest_release(&self, external_id: &str) -> Result<Option<Release>> {
        let response: ChapterListResponse = self
            .get(
                "/chapter",
                &[
                    ("manga", external_id),
                    ("order[chapter]", "desc"),
                    ("translatedLanguage[]", "en"),
                    ("limit", "1"),
                ],
                "chapter list",
            )
            .await?;

        let Some(chapter) = response.data.into_iter().next() else {
            tracing::debug!("No English chapters for {}", external_id);
            return Ok(None);
        };

        let Some(number) = chapter.attributes.chapter.as_deref().and_then(parse_release) else {
            tracing::debug!("Latest chapter of {} has no number", external_id);
            return Ok(None);
        };

        Ok(Some(Release {
            number,
            published_at: chapter
                .attributes
                .updated_at
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok()),
        }))
    }

    fn source_link(&self, external_id: &str) -> String {
        title_link(external_id)
    }

    fn source_name(&self) -> &'static str {
        "mangadex"
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: AuthTokens,
}

#[derive(Debug, Deserialize)]
struct AuthTokens {
    session: String,
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    statuses: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MangaResponse {
    data: MangaData,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: BTreeMap<String, String>,
    #[serde(default)]
    last_chapter: Option<String>,
}

impl MangaAttributes {
    fn preferred_title(&self) -> Option<String> {
        TITLE_PREFERENCE
            .iter()
            .find_map(|lang| self.title.get(*lang))
            .or_else(|| self.title.values().next())
            .filter(|title| !title.is_empty())
            .cloned()
    }
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipAttributes {
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterListResponse {
    #[serde(default)]
    data: Vec<Chapter>,
}

#[derive(Debug, Deserialize)]
struct Chapter {
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}
