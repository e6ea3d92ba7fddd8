use chrono::{Local, TimeZone};
use investai_core::controller::{FetchState, Notice, RecommendationController};
use investai_core::domain::recommendation::RecommendationResult;
use investai_core::session::SessionStore;
use std::fmt::Write;

pub fn recommendation(result: &RecommendationResult) -> String {
    recommendation_in(result, &Local)
}

pub fn recommendation_in<Tz>(result: &RecommendationResult, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let indicators = serde_json::to_string_pretty(&result.indicators)
        .unwrap_or_else(|_| format!("{:?}", result.indicators));

    let mut out = String::new();
    let _ = writeln!(out, "Symbol:         {}", result.symbol);
    let _ = writeln!(out, "Recommendation: {}", result.signal);
    let _ = writeln!(out, "Confidence:     {}%", format_confidence(result.confidence));
    let _ = writeln!(
        out,
        "Time:           {}",
        result.timestamp.with_timezone(tz).format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "Indicators:");
    out.push_str(&indicators);
    out
}

fn format_confidence(confidence: f64) -> String {
    if confidence.fract() == 0.0 {
        format!("{confidence:.0}")
    } else {
        format!("{confidence:.2}")
    }
}

pub fn notice(notice: &Notice) -> String {
    match notice {
        Notice::RecommendationReady => "Recommendation updated.".to_string(),
        Notice::FetchFailed(err) => format!("Could not get a recommendation: {err}"),
        Notice::SessionExpired => "Your session has expired. Please log in again.".to_string(),
        Notice::FavoriteSaved(symbol) => format!("{symbol} added to favorites."),
        Notice::FavoriteFailed { symbol, error } => {
            format!("Could not add {symbol} to favorites: {error}")
        }
        Notice::FavoritesLoaded(symbols) if symbols.is_empty() => "No favorites yet.".to_string(),
        Notice::FavoritesLoaded(symbols) => format!("Favorites: {}", symbols.join(", ")),
        Notice::FavoritesFailed(err) => format!("Could not load favorites: {err}"),
    }
}

pub fn status(session: &SessionStore, controller: &RecommendationController) -> String {
    let user = session.identity().unwrap_or("(not logged in)");
    let query = controller.query();
    let state = match controller.state() {
        FetchState::Idle => "idle".to_string(),
        FetchState::Pending { query, .. } => format!("analyzing {}...", query.symbol()),
        FetchState::Succeeded(result) => format!("ready ({})", result.symbol),
        FetchState::Failed(err) => format!("failed: {err}"),
    };
    format!(
        "user: {user} | symbol: {} | interval: {} | {state}",
        if query.symbol().is_empty() { "-" } else { query.symbol() },
        query.timeframe
    )
}
