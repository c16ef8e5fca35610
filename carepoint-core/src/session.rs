use std::collections::BTreeSet;
use std::sync::Arc;

use carepoint_shared::{Masked, Role};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::identity::AuthTokens;
use crate::kv::KeyValueStore;
use crate::token::decode_payload;
use crate::CoreResult;

/// Storage key of the single persisted session record.
pub const SESSION_KEY: &str = "carepoint.session";

/// The authenticated session, persisted as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub email: String,
    pub id_token: Masked<String>,
    #[serde(default)]
    pub access_token: Masked<String>,
    #[serde(default)]
    pub refresh_token: Masked<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

impl Session {
    /// Build a session from freshly issued tokens. Groups, expiry and subject
    /// come from the id token payload; an undecodable token yields a session
    /// without roles or expiry, which `SessionStore::load` then treats as absent.
    pub fn from_tokens(email: &str, tokens: AuthTokens) -> Self {
        let payload = decode_payload(tokens.id_token.expose()).unwrap_or_else(|e| {
            warn!("Failed to decode id token: {}", e);
            Default::default()
        });

        Self {
            subject_id: payload.subject(),
            email: email.trim().to_lowercase(),
            groups: payload.groups().into_iter().collect(),
            expires_at: payload.expires_at(),
            given_name: payload.given_name(),
            family_name: payload.family_name(),
            id_token: tokens.id_token,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }

    /// Valid iff an expiry is present and strictly in the future.
    pub fn is_valid_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if exp > now)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.groups.contains(role.as_str())
    }

    pub fn roles(&self) -> Vec<Role> {
        self.groups.iter().filter_map(|g| g.parse().ok()).collect()
    }

    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Owns the lifecycle of the persisted session record.
///
/// Every read goes back to storage: there is no in-memory cache, so a
/// sign-out elsewhere is observed on the next `load`.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Option<Session> {
        self.load_at(Utc::now().timestamp())
    }

    /// Load the session as of `now` (epoch seconds).
    ///
    /// Unparsable and expired records are deleted. A record without a subject
    /// id is enriched once from its id token and written back.
    pub fn load_at(&self, now: i64) -> Option<Session> {
        let raw = match self.store.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read session record: {}", e);
                return None;
            }
        };

        let mut session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding unreadable session record: {}", e);
                self.evict();
                return None;
            }
        };

        if !session.is_valid_at(now) {
            info!("Session for {} expired, clearing", session.email);
            self.evict();
            return None;
        }

        if session.subject_id.is_none() {
            match decode_payload(session.id_token.expose()).map(|p| p.subject()) {
                Ok(Some(subject)) => {
                    debug!("Derived subject id for {}", session.email);
                    session.subject_id = Some(subject);
                    if let Err(e) = self.persist(&session) {
                        warn!("Failed to persist session enrichment: {}", e);
                    }
                }
                Ok(None) => debug!("Id token carries no subject"),
                Err(e) => debug!("Id token not decodable, subject left empty: {}", e),
            }
        }

        Some(session)
    }

    /// Overwrite the single persisted session.
    pub fn persist(&self, session: &Session) -> CoreResult<()> {
        let raw = serde_json::to_string(session)
            .map_err(|e| crate::CoreError::StorageError(e.to_string()))?;
        self.store.set(SESSION_KEY, &raw)
    }

    pub fn clear(&self) -> CoreResult<()> {
        self.store.remove(SESSION_KEY)
    }

    pub fn current_email(&self) -> Option<String> {
        self.load().map(|s| s.email)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.load().map(|s| s.has_role(role)).unwrap_or(false)
    }

    fn evict(&self) {
        if let Err(e) = self.clear() {
            warn!("Failed to evict session record: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde_json::json;

    const NOW: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z

    fn token(payload: serde_json::Value) -> String {
        format!(
            "e30.{}.sig",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap())
        )
    }

    fn session(expires_at: Option<i64>) -> Session {
        Session {
            subject_id: Some("patient-1".to_string()),
            email: "pat@example.com".to_string(),
            id_token: token(json!({ "sub": "patient-1" })).into(),
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            groups: ["PATIENT".to_string()].into_iter().collect(),
            expires_at,
            given_name: None,
            family_name: None,
        }
    }

    fn store() -> (Arc<MemoryStore>, SessionStore) {
        let kv = Arc::new(MemoryStore::new());
        (kv.clone(), SessionStore::new(kv))
    }

    #[test]
    fn test_persist_then_load_roundtrip() {
        let (_, sessions) = store();
        let original = session(Some(NOW + 3600));

        sessions.persist(&original).unwrap();
        assert_eq!(sessions.load_at(NOW), Some(original));
    }

    #[test]
    fn test_expired_session_is_evicted() {
        let (kv, sessions) = store();

        sessions.persist(&session(Some(NOW))).unwrap();
        assert_eq!(sessions.load_at(NOW), None);
        assert_eq!(kv.get(SESSION_KEY).unwrap(), None);

        sessions.persist(&session(Some(NOW - 1))).unwrap();
        assert_eq!(sessions.load_at(NOW), None);
        assert_eq!(kv.get(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn test_missing_expiry_is_evicted() {
        let (kv, sessions) = store();
        sessions.persist(&session(None)).unwrap();

        assert_eq!(sessions.load_at(NOW), None);
        assert_eq!(kv.get(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn test_unparsable_record_is_evicted() {
        let (kv, sessions) = store();
        kv.set(SESSION_KEY, "{not json").unwrap();

        assert_eq!(sessions.load_at(NOW), None);
        assert_eq!(kv.get(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn test_subject_enrichment_is_persisted_once() {
        let (kv, sessions) = store();
        let mut stored = session(Some(NOW + 60));
        stored.subject_id = None;
        sessions.persist(&stored).unwrap();

        let loaded = sessions.load_at(NOW).unwrap();
        assert_eq!(loaded.subject_id.as_deref(), Some("patient-1"));

        let raw = kv.get(SESSION_KEY).unwrap().unwrap();
        assert!(raw.contains("\"subjectId\":\"patient-1\""));

        // Second load reads the enriched record unchanged.
        assert_eq!(sessions.load_at(NOW), Some(loaded));
    }

    #[test]
    fn test_undecodable_token_keeps_session_without_subject() {
        let (_, sessions) = store();
        let mut stored = session(Some(NOW + 60));
        stored.subject_id = None;
        stored.id_token = "opaque".into();
        sessions.persist(&stored).unwrap();

        let loaded = sessions.load_at(NOW).unwrap();
        assert_eq!(loaded.subject_id, None);
        assert_eq!(loaded.email, "pat@example.com");
    }

    #[test]
    fn test_from_tokens_reads_claims() {
        let tokens = AuthTokens {
            id_token: token(json!({
                "sub": "doc-9",
                "exp": NOW + 100,
                "cognito:groups": ["DOCTOR", "beta-testers"],
                "given_name": "Ada",
                "family_name": "Lovelace",
            }))
            .into(),
            access_token: "a".into(),
            refresh_token: "r".into(),
        };

        let session = Session::from_tokens(" Ada@Example.COM ", tokens);
        assert_eq!(session.email, "ada@example.com");
        assert_eq!(session.subject_id.as_deref(), Some("doc-9"));
        assert_eq!(session.expires_at, Some(NOW + 100));
        assert!(session.has_role(Role::Doctor));
        assert!(!session.has_role(Role::Patient));
        assert_eq!(session.roles(), vec![Role::Doctor]);
        assert_eq!(session.display_name().as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_clear_is_unconditional() {
        let (_, sessions) = store();
        sessions.clear().unwrap();
        sessions.persist(&session(Some(i64::MAX))).unwrap();
        sessions.clear().unwrap();
        assert_eq!(sessions.load(), None);
    }

    #[test]
    fn test_tokens_do_not_leak_into_debug() {
        let rendered = format!("{:?}", session(Some(NOW)));
        assert!(!rendered.contains("refresh\""));
        assert!(rendered.contains("********"));
    }
}
