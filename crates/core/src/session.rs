use crate::api::{AuthError, InvestApi};
use crate::domain::credential::Credential;
use std::sync::Arc;

/// Sole owner of the session credential.
///
/// Starts without a credential. `login` and `register` are the only ways to obtain one;
/// a failed attempt never touches the credential that is already held.
pub struct SessionStore {
    api: Arc<dyn InvestApi>,
    credential: Option<Credential>,
    identity: Option<String>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn InvestApi>) -> Self {
        Self {
            api,
            credential: None,
            identity: None,
        }
    }

    pub async fn login(&mut self, identifier: &str, secret: &str) -> Result<Credential, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Err(AuthError::Unauthorized(
                "username and password are required".to_string(),
            ));
        }

        match self.api.login(identifier, secret).await {
            Ok(credential) => {
                tracing::info!(user = %identifier, "logged in");
                Ok(self.store(identifier, credential))
            }
            Err(err) => {
                tracing::warn!(user = %identifier, error = %err, "login failed");
                Err(err)
            }
        }
    }

    pub async fn register(
        &mut self,
        identifier: &str,
        secret: &str,
    ) -> Result<Credential, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Err(AuthError::Unauthorized(
                "email and password are required".to_string(),
            ));
        }

        match self.api.register(identifier, secret).await {
            Ok(credential) => {
                tracing::info!(user = %identifier, "registered");
                Ok(self.store(identifier, credential))
            }
            Err(err) => {
                tracing::warn!(user = %identifier, error = %err, "registration failed");
                Err(err)
            }
        }
    }

    fn store(&mut self, identifier: &str, credential: Credential) -> Credential {
        self.credential = Some(credential.clone());
        self.identity = Some(identifier.to_string());
        credential
    }

    pub fn current(&self) -> Option<Credential> {
        self.credential.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn clear(&mut self) {
        if self.credential.take().is_some() {
            tracing::info!(user = ?self.identity, "session cleared");
        }
        self.identity = None;
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("credential", &self.credential)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, FavoriteError, RecommendationError};
    use crate::domain::contract::Profile;
    use crate::domain::recommendation::{RecommendationQuery, RecommendationResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeAuth {
        logins: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl InvestApi for FakeAuth {
        async fn login(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            match (identifier, secret) {
                ("ana@example.com", "hunter2") => Ok(Credential::new("token-ana")),
                ("bob@example.com", "pw") => Ok(Credential::new("token-bob")),
                ("down@example.com", _) => Err(AuthError::Network("connection refused".into())),
                _ => Err(AuthError::Unauthorized("Credenciais inválidas".into())),
            }
        }

        async fn register(&self, identifier: &str, _secret: &str) -> Result<Credential, AuthError> {
            Ok(Credential::new(format!("token-{identifier}")))
        }

        async fn fetch_recommendation(
            &self,
            _credential: &Credential,
            _query: &RecommendationQuery,
        ) -> Result<RecommendationResult, RecommendationError> {
            unreachable!("session store never fetches recommendations")
        }

        async fn add_favorite(
            &self,
            _credential: &Credential,
            _symbol: &str,
        ) -> Result<(), FavoriteError> {
            unreachable!("session store never adds favorites")
        }

        async fn list_favorites(
            &self,
            _credential: &Credential,
        ) -> Result<Vec<String>, FavoriteError> {
            unreachable!("session store never lists favorites")
        }

        async fn profile(&self, _credential: &Credential) -> Result<Profile, ApiError> {
            unreachable!("session store never reads the profile")
        }
    }

    fn store() -> (Arc<FakeAuth>, SessionStore) {
        let api = Arc::new(FakeAuth::default());
        let session = SessionStore::new(api.clone());
        (api, session)
    }

    #[tokio::test]
    async fn starts_without_credential() {
        let (_, session) = store();
        assert!(session.current().is_none());
        assert!(!session.is_authenticated());
        assert_eq!(session.identity(), None);
    }

    #[tokio::test]
    async fn successful_login_stores_credential() {
        let (api, mut session) = store();
        let cred = session.login("ana@example.com", "hunter2").await.unwrap();

        assert_eq!(cred.token(), "token-ana");
        assert_eq!(session.current(), Some(cred));
        assert_eq!(session.identity(), Some("ana@example.com"));
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_login_leaves_state_unchanged() {
        let (_, mut session) = store();
        let err = session.login("ana@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
        assert!(session.current().is_none());

        session.login("bob@example.com", "pw").await.unwrap();
        let err = session.login("down@example.com", "x").await.unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
        assert_eq!(session.current().map(|c| c.token().to_string()), Some("token-bob".into()));
        assert_eq!(session.identity(), Some("bob@example.com"));
    }

    #[tokio::test]
    async fn blank_credentials_never_reach_the_network() {
        let (api, mut session) = store();
        assert!(session.login("  ", "pw").await.is_err());
        assert!(session.login("ana@example.com", "").await.is_err());
        assert_eq!(api.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn register_yields_a_session() {
        let (_, mut session) = store();
        session.register("new@example.com", "pw").await.unwrap();
        assert_eq!(
            session.current().map(|c| c.token().to_string()),
            Some("token-new@example.com".into())
        );
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let (_, mut session) = store();
        session.login("ana@example.com", "hunter2").await.unwrap();

        session.clear();
        assert!(session.current().is_none());
        assert_eq!(session.identity(), None);

        session.clear();
        assert!(session.current().is_none());
    }
}
