use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::future::{ready, Ready};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::deploy::DeployProfiles;
use crate::errors::GproError;
use crate::models::random_token;

pub const SESSION_COOKIE: &str = "gpro_admin";
const TOKEN_LENGTH: usize = 48;

/// One logged-in back-office session
#[derive(Debug)]
pub struct AdminSession {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Saved deployment targets, visible to this session only
    pub deploy_profiles: Mutex<DeployProfiles>,
}

impl AdminSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-memory session table keyed by cookie token
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Arc<AdminSession>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self::with_ttl(Duration::minutes(ttl_minutes))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn create(&self) -> Arc<AdminSession> {
        let now = Utc::now();
        let session = Arc::new(AdminSession {
            token: random_token(TOKEN_LENGTH),
            created_at: now,
            expires_at: now + self.ttl,
            deploy_profiles: Mutex::new(DeployProfiles::default()),
        });
        self.sessions.insert(session.token.clone(), session.clone());
        tracing::info!(expires_at = %session.expires_at, "Admin session created");
        session
    }

    /// Live session for a token; an expired one is removed on the way.
    pub fn get(&self, token: &str) -> Option<Arc<AdminSession>> {
        let session = self.sessions.get(token).map(|entry| entry.value().clone())?;
        if session.is_expired(Utc::now()) {
            self.sessions.remove(token);
            tracing::debug!("Dropped expired admin session");
            return None;
        }
        Some(session)
    }

    pub fn remove(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Extractor for handlers restricted to administrators.
///
/// Resolves the `gpro_admin` cookie against the `SessionStore` registered as
/// app data; anything else is rejected with `Unauthorized` before the
/// handler body runs.
pub struct AdminGuard {
    pub session: Arc<AdminSession>,
}

impl AdminGuard {
    fn resolve(req: &HttpRequest) -> Result<Self, GproError> {
        let store = req.app_data::<web::Data<SessionStore>>().ok_or_else(|| {
            tracing::error!("SessionStore missing from app data");
            GproError::Unauthorized
        })?;
        let cookie = req.cookie(SESSION_COOKIE).ok_or(GproError::Unauthorized)?;
        let session = store.get(cookie.value()).ok_or(GproError::Unauthorized)?;
        Ok(AdminGuard { session })
    }
}

impl FromRequest for AdminGuard {
    type Error = GproError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::resolve(req))
    }
}

/// Compare secrets without stopping at the first differing byte
pub fn secrets_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    #[test]
    fn test_create_and_lookup() {
        let store = SessionStore::new(30);
        let session = store.create();

        assert_eq!(session.token.len(), TOKEN_LENGTH);
        assert!(store.get(&session.token).is_some());
        assert!(store.get("not-a-token").is_none());
        assert!(store.remove(&session.token));
        assert!(store.get(&session.token).is_none());
    }

    #[test]
    fn test_expired_sessions_are_removed_on_lookup() {
        let store = SessionStore::with_ttl(Duration::zero());
        let session = store.create();

        assert_eq!(store.len(), 1);
        assert!(store.get(&session.token).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let expired = SessionStore::with_ttl(Duration::seconds(-1));
        expired.create();
        expired.create();
        assert_eq!(expired.purge_expired(), 2);

        let live = SessionStore::new(5);
        live.create();
        assert_eq!(live.purge_expired(), 0);
    }

    #[test]
    fn test_sessions_do_not_share_deploy_profiles() {
        let store = SessionStore::new(5);
        let a = store.create();
        let b = store.create();

        a.deploy_profiles.lock().save(crate::deploy::FtpProfile {
            name: "prod".to_string(),
            host: "ftp.example.com".to_string(),
            ..Default::default()
        });

        assert_eq!(a.deploy_profiles.lock().list().len(), 1);
        assert!(b.deploy_profiles.lock().list().is_empty());
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("hunter2", "hunter2"));
        assert!(!secrets_match("hunter3", "hunter2"));
        assert!(!secrets_match("hunter", "hunter2"));
    }

    #[actix_web::test]
    async fn test_guard_requires_live_cookie() {
        let store = SessionStore::new(5);
        let session = store.create();
        let data = web::Data::new(store);

        let anonymous = TestRequest::default().app_data(data.clone()).to_http_request();
        assert!(matches!(AdminGuard::resolve(&anonymous), Err(GproError::Unauthorized)));

        let forged = TestRequest::default()
            .app_data(data.clone())
            .cookie(Cookie::new(SESSION_COOKIE, "forged"))
            .to_http_request();
        assert!(matches!(AdminGuard::resolve(&forged), Err(GproError::Unauthorized)));

        let valid = TestRequest::default()
            .app_data(data)
            .cookie(Cookie::new(SESSION_COOKIE, session.token.clone()))
            .to_http_request();
        let guard = AdminGuard::resolve(&valid).ok().unwrap();
        assert_eq!(guard.session.token, session.token);
    }
}
