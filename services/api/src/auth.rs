//! Client token verification.

use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves a client auth token to the username it belongs to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Returns `None` for unknown tokens.
    async fn verify(&self, token: &str) -> Option<String>;
}

/// A fixed token table, loaded from configuration at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticTokens {
    tokens: HashMap<String, String>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_tokens() {
        let tokens = StaticTokens::new(HashMap::from([("abc".to_string(), "dana".to_string())]));
        assert_eq!(tokens.verify("abc").await.as_deref(), Some("dana"));
        assert_eq!(tokens.verify("ABC").await, None);
        assert_eq!(tokens.verify("").await, None);
    }
}
