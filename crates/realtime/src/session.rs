use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use uuid::Uuid;

/// Voice used when the caller does not pick one.
pub const DEFAULT_VOICE: &str = "alloy";

/// Identity and persona for one realtime voice session.
///
/// Built once per session and never mutated; a new conversation gets a new
/// handle (and a new client).
pub struct SessionHandle {
    token: SecretString,
    session_id: Option<Uuid>,
    persona: Option<String>,
    industry: Option<String>,
    value_proposition: Option<String>,
    voice: String,
}

impl SessionHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            session_id: None,
            persona: None,
            industry: None,
            value_proposition: None,
            voice: DEFAULT_VOICE.to_string(),
        }
    }

    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_value_proposition(mut self, value_proposition: impl Into<String>) -> Self {
        self.value_proposition = Some(value_proposition.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn industry(&self) -> Option<&str> {
        self.industry.as_deref()
    }

    pub fn value_proposition(&self) -> Option<&str> {
        self.value_proposition.as_deref()
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Instructions for the AI customer, specialised with whatever persona
    /// details the session carries.
    pub fn instructions(&self) -> String {
        let mut text = String::from(
            "You are an AI sales prospect talking with a salesperson. \
             Stay in character, answer naturally and only reveal needs when asked good questions.",
        );
        if let Some(industry) = &self.industry {
            text.push_str(&format!("\nIndustry: {industry}"));
        }
        if let Some(persona) = &self.persona {
            text.push_str(&format!("\nCustomer persona: {persona}"));
        }
        if let Some(value_proposition) = &self.value_proposition {
            text.push_str(&format!(
                "\nThe salesperson is offering: {value_proposition}"
            ));
        }
        text
    }
}

impl Clone for SessionHandle {
    fn clone(&self) -> Self {
        Self {
            token: SecretString::from(self.token.expose_secret().to_owned()),
            session_id: self.session_id,
            persona: self.persona.clone(),
            industry: self.industry.clone(),
            value_proposition: self.value_proposition.clone(),
            voice: self.voice.clone(),
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("token", &"[REDACTED]")
            .field("session_id", &self.session_id)
            .field("persona", &self.persona)
            .field("industry", &self.industry)
            .field("value_proposition", &self.value_proposition)
            .field("voice", &self.voice)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let handle = SessionHandle::new("tok");
        assert_eq!(handle.token(), "tok");
        assert_eq!(handle.voice(), DEFAULT_VOICE);
        assert!(handle.session_id().is_none());
        assert!(!handle.instructions().contains("Industry"));
    }

    #[test]
    fn test_instructions_include_persona_details() {
        let handle = SessionHandle::new("tok")
            .with_industry("Logistics")
            .with_persona("Cost-focused operations manager")
            .with_value_proposition("Route optimisation SaaS");
        let text = handle.instructions();
        assert!(text.contains("Industry: Logistics"));
        assert!(text.contains("Customer persona: Cost-focused operations manager"));
        assert!(text.contains("Route optimisation SaaS"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let handle = SessionHandle::new("super-secret").with_voice("verse");
        let debug = format!("{handle:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("verse"));
    }
}
