use anyhow::Context;
use clap::{Parser, Subcommand};
use investai_core::api::{HttpInvestApi, InvestApi};
use investai_core::config::Settings;
use investai_core::controller::{Notice, RecommendationController};
use investai_core::domain::recommendation::{RecommendationQuery, Timeframe};
use investai_core::session::SessionStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod render;
mod shell;

#[derive(Debug, Parser)]
#[command(name = "investai", about = "Trading recommendations from the InvestAI backend")]
struct Args {
    /// Backend endpoint (overrides INVESTAI_BASE_URL).
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Account email (overrides INVESTAI_USERNAME).
    #[arg(long, global = true)]
    username: Option<String>,

    /// Account password (overrides INVESTAI_PASSWORD).
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check credentials and show the account.
    Login,
    /// Create an account.
    Register,
    /// Fetch one recommendation and print it.
    Recommend {
        #[arg(long)]
        symbol: Option<String>,
        /// One of 1m, 30m, 1h, 1d.
        #[arg(long)]
        interval: Option<Timeframe>,
    },
    /// Add a symbol to favorites.
    Favorite {
        #[arg(long)]
        symbol: String,
    },
    /// List favorites.
    Favorites,
    /// Interactive session (default).
    Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let settings = apply_overrides(Settings::from_env()?, &args);
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let result = run(args.command.unwrap_or(Command::Shell), &settings).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "investai failed");
    }
    result
}

fn apply_overrides(mut settings: Settings, args: &Args) -> Settings {
    if let Some(base_url) = &args.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(username) = &args.username {
        settings.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        settings.password = Some(password.clone());
    }
    settings
}

async fn run(command: Command, settings: &Settings) -> anyhow::Result<()> {
    let api: Arc<dyn InvestApi> = Arc::new(HttpInvestApi::from_settings(settings)?);
    tracing::debug!(base_url = %settings.base_url, "using backend");

    let query = RecommendationQuery::new(&settings.default_symbol, settings.default_interval);
    let mut controller =
        RecommendationController::new(Arc::clone(&api), query, settings.request_timeout);

    match command {
        Command::Shell => {
            let mut shell = shell::Shell::new(Arc::clone(&api), controller);
            if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
                match shell.session_mut().login(user, pass).await {
                    Ok(_) => println!("Logged in as {user}."),
                    Err(err) => println!("Automatic login failed: {err}"),
                }
            }
            shell.run().await
        }
        Command::Register => {
            let mut session = SessionStore::new(Arc::clone(&api));
            let user = settings.require_username()?;
            session
                .register(user, settings.require_password()?)
                .await
                .context("registration failed")?;
            println!("Registered {user}.");
            Ok(())
        }
        Command::Login => {
            let session = login(&api, settings).await?;
            let credential = session.current().context("login returned no credential")?;
            let profile = api.profile(&credential).await.context("failed to load profile")?;
            println!("Logged in as {}.", profile.email);
            Ok(())
        }
        Command::Recommend { symbol, interval } => {
            let mut session = login(&api, settings).await?;
            if let Some(symbol) = symbol {
                controller.set_symbol(&symbol);
            }
            if let Some(interval) = interval {
                controller.set_timeframe(interval);
            }
            controller.request_fetch(&session)?;
            finish(&mut controller, &mut session).await
        }
        Command::Favorite { symbol } => {
            let mut session = login(&api, settings).await?;
            controller.request_favorite_symbol(&session, &symbol)?;
            finish(&mut controller, &mut session).await
        }
        Command::Favorites => {
            let mut session = login(&api, settings).await?;
            controller.request_favorites(&session)?;
            finish(&mut controller, &mut session).await
        }
    }
}

async fn login(api: &Arc<dyn InvestApi>, settings: &Settings) -> anyhow::Result<SessionStore> {
    let mut session = SessionStore::new(Arc::clone(api));
    session
        .login(settings.require_username()?, settings.require_password()?)
        .await
        .context("login failed")?;
    Ok(session)
}

/// Waits for the single outstanding request of a one-shot command and prints it.
async fn finish(
    controller: &mut RecommendationController,
    session: &mut SessionStore,
) -> anyhow::Result<()> {
    let notice = controller
        .settle(session)
        .await
        .context("request ended without a result")?;

    match &notice {
        Notice::RecommendationReady => {
            let result = controller
                .last_result()
                .context("recommendation missing after success")?;
            println!("{}", render::recommendation(result));
            Ok(())
        }
        Notice::FavoriteSaved(_) | Notice::FavoritesLoaded(_) => {
            println!("{}", render::notice(&notice));
            Ok(())
        }
        _ => anyhow::bail!(render::notice(&notice)),
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recommend_flags() {
        let args = Args::try_parse_from([
            "investai",
            "--base-url",
            "http://10.0.0.5:8000",
            "recommend",
            "--symbol",
            "ethusdt",
            "--interval",
            "30m",
        ])
        .unwrap();

        assert_eq!(args.base_url.as_deref(), Some("http://10.0.0.5:8000"));
        match args.command {
            Some(Command::Recommend { symbol, interval }) => {
                assert_eq!(symbol.as_deref(), Some("ethusdt"));
                assert_eq!(interval, Some(Timeframe::ThirtyMinutes));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_interval() {
        let res = Args::try_parse_from(["investai", "recommend", "--interval", "4h"]);
        assert!(res.is_err());
    }

    #[test]
    fn flags_override_environment_settings() {
        let args = Args::try_parse_from(["investai", "--username", "ana@example.com", "favorites"])
            .unwrap();
        let settings = apply_overrides(Settings::default(), &args);
        assert_eq!(settings.username.as_deref(), Some("ana@example.com"));
        assert_eq!(settings.base_url, investai_core::config::DEFAULT_BASE_URL);
    }
}
