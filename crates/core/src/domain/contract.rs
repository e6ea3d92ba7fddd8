//! Wire shapes returned by the backend, and their conversion into domain types.
//!
//! Everything here is strict: a body that deserializes but violates the contract
//! is rejected, and the caller reports it as malformed.

use crate::domain::credential::Credential;
use crate::domain::recommendation::{RecommendationResult, Signal};
use anyhow::{bail, ensure, Context};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl LoginResponse {
    pub fn validate_and_into_credential(self) -> anyhow::Result<Credential> {
        if let Some(token_type) = self.token_type.as_deref() {
            ensure!(
                token_type.eq_ignore_ascii_case("bearer"),
                "unsupported token_type: {token_type}"
            );
        }
        into_credential(self.access_token)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub email: String,
    pub token: String,
}

impl RegisterResponse {
    pub fn validate_and_into_credential(self, expected_email: &str) -> anyhow::Result<Credential> {
        ensure!(
            self.email.eq_ignore_ascii_case(expected_email.trim()),
            "registration email mismatch: expected {expected_email}, got {}",
            self.email
        );
        into_credential(self.token)
    }
}

fn into_credential(token: String) -> anyhow::Result<Credential> {
    let token = token.trim().to_string();
    ensure!(!token.is_empty(), "access token must be non-empty");
    ensure!(
        !token.chars().any(|c| c.is_whitespace() || c.is_control()),
        "access token contains whitespace or control characters"
    );
    Ok(Credential::new(token))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationResponse {
    #[serde(default)]
    pub symbol: Option<String>,
    pub signal: String,
    pub confidence: f64,
    pub timestamp: String,
    pub indicators: BTreeMap<String, f64>,
}

impl RecommendationResponse {
    pub fn validate_and_into_result(
        self,
        requested_symbol: &str,
    ) -> anyhow::Result<RecommendationResult> {
        let symbol = match self.symbol {
            Some(echoed) => {
                let echoed = echoed.trim().to_ascii_uppercase();
                ensure!(
                    echoed == requested_symbol,
                    "symbol mismatch: requested {requested_symbol}, got {echoed}"
                );
                echoed
            }
            None => requested_symbol.to_string(),
        };

        let Some(signal) = Signal::from_label(&self.signal) else {
            bail!("unknown signal label: {:?}", self.signal);
        };

        ensure!(
            self.confidence.is_finite() && (0.0..=100.0).contains(&self.confidence),
            "confidence must be between 0 and 100 (got {})",
            self.confidence
        );

        let timestamp = parse_timestamp(&self.timestamp)?;

        for (name, value) in &self.indicators {
            ensure!(!name.trim().is_empty(), "indicator name must be non-empty");
            ensure!(value.is_finite(), "indicator {name} is not finite");
        }

        Ok(RecommendationResult {
            symbol,
            signal,
            confidence: self.confidence,
            timestamp,
            indicators: self.indicators,
        })
    }
}

/// Accepts RFC 3339, or a naive ISO-8601 date-time which is wall-clock time in the local
/// time zone (the backend stamps results with its own local clock and no offset).
pub fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let t = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("timestamp is not ISO-8601: {t:?}"))?;
    let local = naive
        .and_local_timezone(Local)
        .earliest()
        .with_context(|| format!("timestamp does not exist in the local time zone: {t:?}"))?;
    Ok(local.with_timezone(&Utc))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub email: String,
}

impl ProfileResponse {
    pub fn validate_and_into_profile(self) -> anyhow::Result<Profile> {
        let email = self.email.trim().to_string();
        ensure!(!email.is_empty(), "profile email must be non-empty");
        Ok(Profile { email })
    }
}

/// Favorites come back as a bare JSON array of symbols.
pub fn validate_favorites(symbols: Vec<String>) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = symbol.trim().to_ascii_uppercase();
        ensure!(!symbol.is_empty(), "favorite symbol must be non-empty");
        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    Ok(out)
}

/// FastAPI error bodies look like `{"detail": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub detail: serde_json::Value,
}

pub fn error_detail(body: &str) -> String {
    fastapi_detail(body).unwrap_or_else(|| body.trim().chars().take(200).collect())
}

/// The `detail` of a well-formed FastAPI error body, if the body is one.
pub fn fastapi_detail(body: &str) -> Option<String> {
    match serde_json::from_str::<ErrorDetail>(body).ok()? {
        ErrorDetail {
            detail: serde_json::Value::String(s),
        } => Some(s),
        ErrorDetail { detail } => Some(detail.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn parse_recommendation(v: serde_json::Value) -> anyhow::Result<RecommendationResult> {
        let raw: RecommendationResponse = serde_json::from_value(v)?;
        raw.validate_and_into_result("BTCUSDT")
    }

    #[test]
    fn accepts_backend_recommendation_shape() {
        let result = parse_recommendation(json!({
            "symbol": "BTCUSDT",
            "signal": "Compra",
            "confidence": 66.67,
            "timestamp": "2026-01-27T10:00:00.123456",
            "indicators": {"RSI": 28.4, "MACD": 1.2, "SMA": 41000.0, "Preço": 41250.5}
        }))
        .unwrap();

        assert_eq!(result.signal, Signal::Buy);
        assert_eq!(result.symbol, "BTCUSDT");
        assert_eq!(result.indicators.len(), 4);
        assert_eq!(result.indicators.get("Preço").copied(), Some(41250.5));
        assert_eq!(
            result.timestamp.with_timezone(&Local).naive_local(),
            NaiveDateTime::parse_from_str("2026-01-27T10:00:00.123456", "%Y-%m-%dT%H:%M:%S%.f")
                .unwrap()
        );
    }

    #[test]
    fn naive_timestamp_is_local_wall_clock_and_offsets_are_kept() {
        let naive = parse_timestamp("2026-01-27T10:00:00").unwrap();
        assert_eq!(
            naive.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            "2026-01-27 10:00:00"
        );

        let offset = parse_timestamp("2026-01-27T10:00:00-03:00").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2026, 1, 27, 13, 0, 0).unwrap());
        assert!(parse_timestamp("27/01/2026 10:00").is_err());
    }

    #[test]
    fn missing_symbol_echo_falls_back_to_request() {
        let result = parse_recommendation(json!({
            "signal": "BUY",
            "confidence": 87,
            "timestamp": "2026-01-27T10:00:00Z",
            "indicators": {"rsi": 30}
        }))
        .unwrap();
        assert_eq!(result.symbol, "BTCUSDT");
        assert_eq!(result.confidence, 87.0);
    }

    #[test]
    fn rejects_contract_violations() {
        let base = json!({
            "symbol": "BTCUSDT",
            "signal": "BUY",
            "confidence": 50,
            "timestamp": "2026-01-27T10:00:00Z",
            "indicators": {}
        });

        let mut wrong_symbol = base.clone();
        wrong_symbol["symbol"] = json!("ETHUSDT");
        assert!(parse_recommendation(wrong_symbol).is_err());

        let mut bad_signal = base.clone();
        bad_signal["signal"] = json!("to the moon");
        assert!(parse_recommendation(bad_signal).is_err());

        let mut bad_confidence = base.clone();
        bad_confidence["confidence"] = json!(140.0);
        assert!(parse_recommendation(bad_confidence).is_err());

        let mut bad_time = base.clone();
        bad_time["timestamp"] = json!("yesterday");
        assert!(parse_recommendation(bad_time).is_err());

        let mut text_indicator = base;
        text_indicator["indicators"] = json!({"rsi": "30"});
        assert!(parse_recommendation(text_indicator).is_err());
    }

    #[test]
    fn login_token_must_be_usable() {
        let ok: LoginResponse =
            serde_json::from_value(json!({"access_token": "abc.def", "token_type": "bearer"}))
                .unwrap();
        assert_eq!(ok.validate_and_into_credential().unwrap().token(), "abc.def");

        let empty: LoginResponse = serde_json::from_value(json!({"access_token": " "})).unwrap();
        assert!(empty.validate_and_into_credential().is_err());

        let other: LoginResponse =
            serde_json::from_value(json!({"access_token": "abc", "token_type": "mac"})).unwrap();
        assert!(other.validate_and_into_credential().is_err());

        assert!(serde_json::from_value::<LoginResponse>(json!({"token": "abc"})).is_err());
    }

    #[test]
    fn favorites_are_normalized_and_deduplicated() {
        let symbols = vec!["btcusdt".to_string(), "ETHUSDT".to_string(), "BTCUSDT".to_string()];
        assert_eq!(
            validate_favorites(symbols).unwrap(),
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
        );
        assert!(validate_favorites(vec![String::new()]).is_err());
    }

    #[test]
    fn error_detail_prefers_fastapi_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"Credenciais inválidas"}"#),
            "Credenciais inválidas"
        );
        assert_eq!(error_detail("Internal Server Error"), "Internal Server Error");
        assert_eq!(fastapi_detail("<html>502</html>"), None);
        assert_eq!(
            fastapi_detail(r#"{"detail":"Erro ao gerar recomendação"}"#).as_deref(),
            Some("Erro ao gerar recomendação")
        );
    }
}
