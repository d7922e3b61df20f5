//! Explicit application state: who is logged in and which training session
//! is active.

use crate::error::ApiError;
use salesmind_realtime::SessionHandle;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use uuid::Uuid;

/// Scenario details used to brief the simulated customer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionProfile {
    pub industry: Option<String>,
    pub value_proposition: Option<String>,
    pub customer_persona: Option<String>,
}

struct Credentials {
    token: SecretString,
    username: Option<String>,
}

struct ActiveSession {
    id: Uuid,
    profile: SessionProfile,
}

#[derive(Default)]
pub struct AppSession {
    credentials: Option<Credentials>,
    session: Option<ActiveSession>,
}

impl AppSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&mut self, token: impl Into<String>, username: Option<String>) {
        info!(username = username.as_deref().unwrap_or("<unknown>"), "Logged in");
        self.credentials = Some(Credentials {
            token: SecretString::from(token.into()),
            username,
        });
    }

    /// Drops the token and any active session.
    pub fn logout(&mut self) {
        if self.credentials.take().is_some() {
            info!("Logged out");
        }
        self.session = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref()?.username.as_deref()
    }

    pub fn token(&self) -> Result<&str, ApiError> {
        self.credentials
            .as_ref()
            .map(|c| c.token.expose_secret())
            .ok_or(ApiError::NotAuthenticated)
    }

    pub fn begin_session(&mut self, id: Uuid, profile: SessionProfile) {
        info!(session_id = %id, "Training session started");
        self.session = Some(ActiveSession { id, profile });
    }

    pub fn end_session(&mut self) -> Option<Uuid> {
        let ended = self.session.take().map(|s| s.id);
        if let Some(id) = ended {
            info!(session_id = %id, "Training session ended");
        }
        ended
    }

    pub fn current_session(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn profile(&self) -> Option<&SessionProfile> {
        self.session.as_ref().map(|s| &s.profile)
    }

    /// Credentials for a voice session in the current training session.
    pub fn realtime_handle(&self) -> Result<SessionHandle, ApiError> {
        let mut handle = SessionHandle::new(self.token()?);
        if let Some(session) = &self.session {
            handle = handle.with_session_id(session.id);
            let profile = &session.profile;
            if let Some(industry) = &profile.industry {
                handle = handle.with_industry(industry.clone());
            }
            if let Some(value) = &profile.value_proposition {
                handle = handle.with_value_proposition(value.clone());
            }
            if let Some(persona) = &profile.customer_persona {
                handle = handle.with_persona(persona.clone());
            }
        }
        Ok(handle)
    }
}

impl std::fmt::Debug for AppSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSession")
            .field("authenticated", &self.is_authenticated())
            .field("username", &self.username())
            .field("current_session", &self.current_session())
            .finish()
    }
}
