//! REST client for the SalesMind training backend.

use crate::{
    app_state::{AppSession, SessionProfile},
    chat::{ChatStream, decode_chat_stream},
    error::ApiError,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Quick diagnosis from industry and value proposition alone.
    #[default]
    Simple,
    Detailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartSessionRequest {
    pub mode: SessionMode,
    pub industry: String,
    pub value_proposition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_persona: Option<String>,
}

impl StartSessionRequest {
    pub fn profile(&self) -> SessionProfile {
        SessionProfile {
            industry: Some(self.industry.clone()),
            value_proposition: Some(self.value_proposition.clone()),
            customer_persona: self.customer_persona.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinishReport {
    #[serde(default)]
    pub report_id: Option<Value>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `https://host/api/`.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self::with_client(Client::new(), Url::parse(base_url)?))
    }

    pub fn with_client(http: Client, mut base_url: Url) -> Self {
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorized(
        &self,
        builder: RequestBuilder,
        app: &AppSession,
    ) -> Result<RequestBuilder, ApiError> {
        Ok(builder.header(reqwest::header::AUTHORIZATION, format!("Token {}", app.token()?)))
    }

    /// Exchanges credentials for a token and stores it in `app`.
    pub async fn login(
        &self,
        app: &mut AppSession,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, ApiError> {
        info!(username, "Logging in");
        let response = self
            .http
            .post(self.endpoint("auth/login/")?)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let login: LoginResponse = check_status(response).await?.json().await?;
        let name = login.username.clone().or_else(|| Some(username.to_string()));
        app.login(login.token.clone(), name);
        Ok(login)
    }

    /// Starts a training session and makes it the current one in `app`.
    pub async fn start_session(
        &self,
        app: &mut AppSession,
        request: &StartSessionRequest,
    ) -> Result<SessionInfo, ApiError> {
        let builder = self.http.post(self.endpoint("session/start/")?).json(request);
        let response = self.authorized(builder, app)?.send().await?;
        let info: SessionInfo = check_auth(app, response).await?.json().await?;
        app.begin_session(info.id, request.profile());
        Ok(info)
    }

    /// Ends the current session and returns its scoring report.
    pub async fn finish_session(&self, app: &mut AppSession) -> Result<FinishReport, ApiError> {
        let session_id = app.current_session().ok_or(ApiError::NoActiveSession)?;
        let builder = self
            .http
            .post(self.endpoint("session/finish/")?)
            .json(&json!({ "session_id": session_id }));
        let response = self.authorized(builder, app)?.send().await?;
        let report: FinishReport = check_auth(app, response).await?.json().await?;
        app.end_session();
        debug!(report_id = ?report.report_id, "Session finished");
        Ok(report)
    }

    /// Sends `message` in the current session and streams the reply.
    pub async fn chat_stream(
        &self,
        app: &mut AppSession,
        message: &str,
    ) -> Result<ChatStream, ApiError> {
        let session_id = app.current_session().ok_or(ApiError::NoActiveSession)?;
        let builder = self
            .http
            .post(self.endpoint("session/chat/stream/")?)
            .json(&json!({ "session_id": session_id, "message": message }));
        let response = self.authorized(builder, app)?.send().await?;
        let response = check_auth(app, response).await?;
        Ok(decode_chat_stream(response.bytes_stream()))
    }
}

/// Like [`check_status`], but logs `app` out when the token was rejected.
async fn check_auth(app: &mut AppSession, response: Response) -> Result<Response, ApiError> {
    let result = check_status(response).await;
    if matches!(result, Err(ApiError::Unauthorized)) {
        warn!("Token rejected by server; logging out");
        app.logout();
    }
    result
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
