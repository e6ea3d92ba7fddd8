use crate::api::error::{ApiError, AuthError, FavoriteError, RecommendationError};
use crate::api::InvestApi;
use crate::config::Settings;
use crate::domain::contract::{
    error_detail, fastapi_detail, validate_favorites, LoginResponse, Profile, ProfileResponse,
    RecommendationResponse, RegisterRequest, RegisterResponse,
};
use crate::domain::credential::Credential;
use crate::domain::recommendation::{RecommendationQuery, RecommendationResult};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

const LOGIN_PATH: &str = "/api/login";
const REGISTER_PATH: &str = "/api/register";
const RECOMMEND_PATH: &str = "/api/recommend";
const FAVORITE_PATH: &str = "/api/favorite";
const FAVORITES_PATH: &str = "/api/favorites";
const PROFILE_PATH: &str = "/api/me";

#[derive(Debug, Clone)]
pub struct HttpInvestApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpInvestApi {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        settings.validate()?;
        Self::new(&settings.base_url, settings.request_timeout)
    }

    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build InvestAI http client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(credential: &Credential) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(&credential.bearer())
            .map_err(|_| ApiError::Unauthenticated)?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn read_auth_response<T: DeserializeOwned>(
        res: reqwest::Response,
        path: &'static str,
    ) -> Result<T, AuthError> {
        let status = res.status();
        let text = res.text().await?;

        if !status.is_success() {
            let detail = error_detail(&text);
            tracing::warn!(path, http_status = %status, %detail, "auth request rejected");
            return Err(if status.is_server_error() {
                AuthError::Network(format!("server returned {status}: {detail}"))
            } else {
                AuthError::Unauthorized(detail)
            });
        }

        serde_json::from_str::<T>(&text).map_err(|err| {
            tracing::warn!(path, error = %err, "auth response does not match schema");
            AuthError::Malformed(format!("{path}: {err}"))
        })
    }

    async fn read_api_response<T: DeserializeOwned>(
        res: reqwest::Response,
        path: &'static str,
    ) -> Result<T, ApiError> {
        let status = res.status();
        let text = res.text().await?;
        check_api_status(status, &text, path)?;

        serde_json::from_str::<T>(&text).map_err(|err| {
            tracing::warn!(path, error = %err, "response does not match schema");
            ApiError::Malformed(format!("{path}: {err}"))
        })
    }
}

fn check_api_status(status: StatusCode, body: &str, path: &'static str) -> Result<(), ApiError> {
    if status.is_success() {
        return Ok(());
    }

    let detail = error_detail(body);
    tracing::warn!(path, http_status = %status, %detail, "request failed");

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthenticated);
    }
    if status.is_server_error() {
        // The backend reports an unusable request (e.g. an unknown symbol) as a 500 with a
        // FastAPI detail body. Gateway errors and non-JSON bodies mean it was not reached.
        let gateway = matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        );
        return Err(match fastapi_detail(body) {
            Some(detail) if !gateway => {
                ApiError::Malformed(format!("server rejected the request: {detail}"))
            }
            _ => ApiError::Network(format!("server returned {status}: {detail}")),
        });
    }
    Err(ApiError::Malformed(format!("server returned {status}: {detail}")))
}

#[async_trait::async_trait]
impl InvestApi for HttpInvestApi {
    async fn login(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError> {
        tracing::debug!(path = LOGIN_PATH, "sending login request");

        let res = self
            .http
            .post(self.url(LOGIN_PATH))
            .form(&[("username", identifier), ("password", secret)])
            .send()
            .await?;

        let body: LoginResponse = Self::read_auth_response(res, LOGIN_PATH).await?;
        body.validate_and_into_credential()
            .map_err(|err| AuthError::Malformed(format!("{err:#}")))
    }

    async fn register(&self, identifier: &str, secret: &str) -> Result<Credential, AuthError> {
        tracing::debug!(path = REGISTER_PATH, "sending registration request");

        let res = self
            .http
            .post(self.url(REGISTER_PATH))
            .json(&RegisterRequest {
                email: identifier,
                password: secret,
            })
            .send()
            .await?;

        let body: RegisterResponse = Self::read_auth_response(res, REGISTER_PATH).await?;
        body.validate_and_into_credential(identifier)
            .map_err(|err| AuthError::Malformed(format!("{err:#}")))
    }

    async fn fetch_recommendation(
        &self,
        credential: &Credential,
        query: &RecommendationQuery,
    ) -> Result<RecommendationResult, RecommendationError> {
        let symbol = query.symbol();
        tracing::debug!(%symbol, interval = %query.timeframe, "requesting recommendation");

        let res = self
            .http
            .get(self.url(RECOMMEND_PATH))
            .headers(Self::headers(credential)?)
            .query(&[("symbol", symbol), ("interval", query.timeframe.code())])
            .send()
            .await?;

        let body: RecommendationResponse = Self::read_api_response(res, RECOMMEND_PATH).await?;
        body.validate_and_into_result(symbol)
            .map_err(|err| ApiError::Malformed(format!("{err:#}")))
    }

    async fn add_favorite(
        &self,
        credential: &Credential,
        symbol: &str,
    ) -> Result<(), FavoriteError> {
        tracing::debug!(%symbol, "adding favorite");

        let res = self
            .http
            .post(self.url(FAVORITE_PATH))
            .headers(Self::headers(credential)?)
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        // The acknowledgement body carries nothing we need; only the status matters.
        let status = res.status();
        let text = res.text().await?;
        check_api_status(status, &text, FAVORITE_PATH)
    }

    async fn list_favorites(&self, credential: &Credential) -> Result<Vec<String>, FavoriteError> {
        let res = self
            .http
            .get(self.url(FAVORITES_PATH))
            .headers(Self::headers(credential)?)
            .send()
            .await?;

        let body: Vec<String> = Self::read_api_response(res, FAVORITES_PATH).await?;
        validate_favorites(body).map_err(|err| ApiError::Malformed(format!("{err:#}")))
    }

    async fn profile(&self, credential: &Credential) -> Result<Profile, ApiError> {
        let res = self
            .http
            .get(self.url(PROFILE_PATH))
            .headers(Self::headers(credential)?)
            .send()
            .await?;

        let body: ProfileResponse = Self::read_api_response(res, PROFILE_PATH).await?;
        body.validate_and_into_profile()
            .map_err(|err| ApiError::Malformed(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_for_authenticated_calls() {
        assert_eq!(check_api_status(StatusCode::OK, "", "/x"), Ok(()));
        assert_eq!(
            check_api_status(StatusCode::UNAUTHORIZED, r#"{"detail":"Token expirado"}"#, "/x"),
            Err(ApiError::Unauthenticated)
        );
        assert_eq!(
            check_api_status(StatusCode::FORBIDDEN, "", "/x"),
            Err(ApiError::Unauthenticated)
        );
        assert!(matches!(
            check_api_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail":[]}"#, "/x"),
            Err(ApiError::Malformed(_))
        ));
        assert!(matches!(
            check_api_status(StatusCode::BAD_GATEWAY, "upstream", "/x"),
            Err(ApiError::Network(msg)) if msg.contains("upstream")
        ));
    }

    #[test]
    fn server_error_with_detail_is_malformed_unless_gateway() {
        let detail = r#"{"detail":"Erro ao gerar recomendação"}"#;
        assert!(matches!(
            check_api_status(StatusCode::INTERNAL_SERVER_ERROR, detail, "/x"),
            Err(ApiError::Malformed(msg)) if msg.contains("Erro ao gerar")
        ));
        assert!(matches!(
            check_api_status(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", "/x"),
            Err(ApiError::Network(_))
        ));
        assert!(matches!(
            check_api_status(StatusCode::SERVICE_UNAVAILABLE, detail, "/x"),
            Err(ApiError::Network(_))
        ));
    }

    #[test]
    fn base_url_is_joined_without_double_slash() {
        let api = HttpInvestApi::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.url(LOGIN_PATH), "http://localhost:8000/api/login");
    }

    #[test]
    fn bearer_header_is_sensitive() {
        let headers = HttpInvestApi::headers(&Credential::new("tok")).unwrap();
        let value = headers.get(AUTHORIZATION).unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().unwrap(), "Bearer tok");
    }
}
