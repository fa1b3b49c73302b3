//! Authenticated session lookup.
//!
//! Route handlers ask a [`SessionProvider`] for the caller before touching any
//! record. The bundled provider resolves bearer tokens against a fixed table;
//! tokens are only kept as SHA-256 digests.

use crate::error::TrawlError;
use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

pub trait SessionProvider: Send + Sync + 'static {
    fn current_session(&self, headers: &HeaderMap) -> Option<Session>;
}

pub struct TokenSessions {
    users_by_digest: HashMap<String, String>,
}

impl TokenSessions {
    pub fn new<I, T, U>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, U)>,
        T: AsRef<str>,
        U: Into<String>,
    {
        let users_by_digest = pairs
            .into_iter()
            .map(|(token, user)| (digest(token.as_ref()), user.into()))
            .collect();
        Self { users_by_digest }
    }

    /// Parse `token:user,token:user`.
    pub fn parse(tokens: &str) -> Result<Self, TrawlError> {
        let mut pairs = Vec::new();
        for item in tokens.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.split_once(':') {
                Some((token, user)) if !token.is_empty() && !user.is_empty() => {
                    pairs.push((token.to_string(), user.to_string()));
                }
                _ => {
                    return Err(TrawlError::Config(format!(
                        "invalid session token entry '{}', expected token:user",
                        item
                    )))
                }
            }
        }
        Ok(Self::new(pairs))
    }

    pub fn user_ids(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users_by_digest.values().cloned().collect();
        users.sort();
        users.dedup();
        users
    }

    pub fn is_empty(&self) -> bool {
        self.users_by_digest.is_empty()
    }
}

impl SessionProvider for TokenSessions {
    fn current_session(&self, headers: &HeaderMap) -> Option<Session> {
        let token = headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?
            .trim();

        let session = self
            .users_by_digest
            .get(&digest(token))
            .map(|user_id| Session {
                user_id: user_id.clone(),
            });

        if session.is_none() {
            debug!("Bearer token did not match any session");
        }
        session
    }
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_token_lookup() {
        let sessions = TokenSessions::parse("alpha:user-1, beta:user-2").unwrap();

        assert_eq!(
            sessions.current_session(&bearer("alpha")),
            Some(Session {
                user_id: "user-1".into()
            })
        );
        assert_eq!(
            sessions.current_session(&bearer("beta")).unwrap().user_id,
            "user-2"
        );
        assert!(sessions.current_session(&bearer("gamma")).is_none());
        assert!(sessions.current_session(&HeaderMap::new()).is_none());
        assert_eq!(sessions.user_ids(), vec!["user-1", "user-2"]);
    }

    #[test]
    fn test_parse_rejects_malformed_entries() {
        assert!(TokenSessions::parse("alpha").is_err());
        assert!(TokenSessions::parse(":user").is_err());
        assert!(TokenSessions::parse("").unwrap().is_empty());
    }
}
