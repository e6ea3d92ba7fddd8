pub mod error;
pub mod http;

use crate::domain::contract::Profile;
use crate::domain::credential::Credential;
use crate::domain::recommendation::{RecommendationQuery, RecommendationResult};

pub use error::{ApiError, AuthError, FavoriteError, RecommendationError};
pub use http::HttpInvestApi;

/// Remote operations of the InvestAI backend. Implementations hold no session state:
/// every authenticated call receives the credential explicitly.
#[async_trait::async_trait]
pub trait InvestApi: Send + Sync {
    async fn login(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError>;

    async fn register(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError>;

    async fn fetch_recommendation(
        &self,
        credential: &Credential,
        query: &RecommendationQuery,
    ) -> Result<RecommendationResult, RecommendationError>;

    async fn add_favorite(&self, credential: &Credential, symbol: &str)
        -> Result<(), FavoriteError>;

    async fn list_favorites(&self, credential: &Credential) -> Result<Vec<String>, FavoriteError>;

    async fn profile(&self, credential: &Credential) -> Result<Profile, ApiError>;
}
