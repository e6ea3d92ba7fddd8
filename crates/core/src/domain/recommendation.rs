use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Accepts the English labels and the Portuguese ones the backend emits.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "buy" | "compra" => Some(Self::Buy),
            "sell" | "venda" => Some(Self::Sell),
            "hold" | "aguardar" | "wait" => Some(Self::Hold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::OneMinute,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::OneDay,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown timeframe {0:?} (expected one of 1m, 30m, 1h, 1d)")]
pub struct UnknownTimeframe(pub String);

impl FromStr for Timeframe {
    type Err = UnknownTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Timeframe::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| UnknownTimeframe(code.to_string()))
    }
}

/// What the user currently has selected. Edits never trigger a fetch on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationQuery {
    symbol: String,
    pub timeframe: Timeframe,
}

impl RecommendationQuery {
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            timeframe,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn set_symbol(&mut self, symbol: &str) {
        self.symbol = normalize_symbol(symbol);
    }

    pub fn is_complete(&self) -> bool {
        !self.symbol.is_empty()
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub symbol: String,
    pub signal: Signal,
    /// Percentage in `0.0..=100.0`.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub indicators: BTreeMap<String, f64>,
}
