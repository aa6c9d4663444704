/// HTTP client facade for the AI Studio backend
///
/// Wraps the credentialed endpoints: profile, model listing, training
/// submission, video job start/status/result/list, sign-in/out. Every
/// call returns the decoded body or an `ApiError`; retry policy belongs
/// to callers, not to this layer.
use reqwest::multipart;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub mod config;
pub mod error;
pub mod models;

pub use config::ApiConfig;
pub use error::ApiError;
pub use models::{ModelRef, RawJobStatus, StartResponse, User, VideoRecord};

use models::StatusResponse;

/// Backend client
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_credentials(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.session_cookie {
            Some(cookie) => req.header(reqwest::header::COOKIE, cookie.clone()),
            None => req,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_credentials(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_credentials(self.http.post(self.url(path)))
    }

    /// Current authenticated user; 401 maps to `Unauthenticated`.
    pub async fn profile(&self) -> Result<User, ApiError> {
        let resp = self.get("/api/profile").send().await?;
        decode(expect_success(resp)?).await
    }

    /// Session resolution: any failure means "no user", never a fatal
    /// error. Resolved once per invocation, no background refresh.
    pub async fn current_user(&self) -> Option<User> {
        match self.profile().await {
            Ok(user) => Some(user),
            Err(e) => {
                debug!("profile fetch failed, treating as signed out: {e}");
                None
            }
        }
    }

    /// Personal and shared models merged, keeping only completed entries.
    pub async fn list_models(&self) -> Result<Vec<ModelRef>, ApiError> {
        let (mine, shared) = tokio::join!(
            self.fetch_models("/api/my-models"),
            self.fetch_models("/api/shared-models"),
        );
        let mut models = mine?;
        models.extend(shared?);
        models.retain(ModelRef::is_completed);
        Ok(models)
    }

    async fn fetch_models(&self, path: &str) -> Result<Vec<ModelRef>, ApiError> {
        let resp = self.get(path).send().await?;
        decode(expect_success(resp)?).await
    }

    /// Submit a training request: character name plus every selected file
    /// in one multipart body, all files under the `files` key.
    pub async fn start_training(&self, name: &str, files: &[&Path]) -> Result<(), ApiError> {
        let mut form = multipart::Form::new().text("name", name.to_string());
        for path in files {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ApiError::Decode(format!("read {}: {e}", path.display())))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            form = form.part("files", multipart::Part::bytes(bytes).file_name(file_name));
        }
        let resp = self.post("/api/train").multipart(form).send().await?;
        expect_success(resp)?;
        Ok(())
    }

    /// Start a video generation job; returns the backend-assigned
    /// prompt id used for all subsequent status/result queries.
    pub async fn start_video(&self, prompt: &str, model_id: i64) -> Result<String, ApiError> {
        let params = [("prompt", prompt.to_string()), ("id", model_id.to_string())];
        let resp = self.post("/api/video/start").form(&params).send().await?;
        let start: StartResponse = decode(expect_success(resp)?).await?;
        Ok(start.prompt_id)
    }

    /// Job status; 404 means the backend no longer knows the id.
    pub async fn video_status(&self, prompt_id: &str) -> Result<RawJobStatus, ApiError> {
        let resp = self
            .get(&format!("/api/video/status/{prompt_id}"))
            .send()
            .await?;
        let status: StatusResponse = decode(expect_success(resp)?).await?;
        RawJobStatus::parse(&status.status)
    }

    /// Result locator for a finished job.
    pub async fn video_result(&self, prompt_id: &str) -> Result<String, ApiError> {
        let resp = self
            .get(&format!("/api/video/result/{prompt_id}"))
            .send()
            .await?;
        decode(expect_success(resp)?).await
    }

    /// Historical generation records, newest first as the backend returns
    /// them.
    pub async fn list_videos(&self) -> Result<Vec<VideoRecord>, ApiError> {
        let resp = self.get("/api/video/list").send().await?;
        decode(expect_success(resp)?).await
    }

    /// OAuth sign-in URL hosted by the backend. The flow itself is the
    /// backend's business; we only construct the redirect.
    pub fn sign_in_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?redirect_uri={}",
            self.url("/oauth2/authorization/google"),
            urlencoding::encode(redirect_uri)
        )
    }

    /// Invalidate the backend session.
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        let resp = self.post("/api/auth/logout").send().await?;
        expect_success(resp)?;
        Ok(())
    }
}

fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    match resp.status() {
        s if s.is_success() => Ok(resp),
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthenticated),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        s => Err(ApiError::Http { status: s.as_u16() }),
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    resp.json().await.map_err(|e| {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e)
        }
    })
}
