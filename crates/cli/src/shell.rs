//! Interactive terminal front end: reads intents from stdin, applies them to the
//! controller and prints whatever changed.

use crate::render;
use anyhow::Context;
use investai_core::api::InvestApi;
use investai_core::controller::{Dispatch, IntentError, Notice, RecommendationController};
use investai_core::domain::recommendation::Timeframe;
use investai_core::session::SessionStore;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  login <email> <password>     authenticate
  register <email> <password>  create an account and log in
  logout                       forget the session
  symbol <SYMBOL>              change the instrument (e.g. BTCUSDT)
  interval <1m|30m|1h|1d>      change the timeframe
  fetch                        request a recommendation
  favorite [SYMBOL]            add the current (or given) symbol to favorites
  favorites                    list favorites
  me                           show the logged-in account
  status                       show session and request state
  help                         show this help
  quit                         exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { identifier: String, secret: String },
    Register { identifier: String, secret: String },
    Logout,
    Symbol(String),
    Interval(Timeframe),
    Fetch,
    Favorite(Option<String>),
    Favorites,
    Me,
    Status,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();

    let command = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("login", [identifier, secret]) => Command::Login {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
        },
        ("register", [identifier, secret]) => Command::Register {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
        },
        ("login" | "register", _) => return Err(format!("usage: {head} <email> <password>")),
        ("logout", []) => Command::Logout,
        ("symbol", [symbol]) => Command::Symbol(symbol.to_string()),
        ("symbol", _) => return Err("usage: symbol <SYMBOL>".to_string()),
        ("interval", [code]) => Command::Interval(code.parse().map_err(|e| format!("{e}"))?),
        ("interval", _) => return Err("usage: interval <1m|30m|1h|1d>".to_string()),
        ("fetch" | "recommend", []) => Command::Fetch,
        ("favorite", []) => Command::Favorite(None),
        ("favorite", [symbol]) => Command::Favorite(Some(symbol.to_string())),
        ("favorites", []) => Command::Favorites,
        ("me", []) => Command::Me,
        ("status", []) => Command::Status,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        _ => return Err(format!("unknown command: {line}. Type `help`.")),
    };
    Ok(Some(command))
}

pub struct Shell {
    api: Arc<dyn InvestApi>,
    session: SessionStore,
    controller: RecommendationController,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

impl Shell {
    pub fn new(api: Arc<dyn InvestApi>, controller: RecommendationController) -> Self {
        Self {
            session: SessionStore::new(Arc::clone(&api)),
            api,
            controller,
        }
    }

    pub fn session_mut(&mut self) -> &mut SessionStore {
        &mut self.session
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{HELP}");
        prompt(&self);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("failed to read stdin")? else {
                        break;
                    };
                    if self.dispatch(&line).await == Flow::Quit {
                        break;
                    }
                    prompt(&self);
                }
                Some(completion) = self.controller.next_completion() => {
                    if let Some(notice) = self.controller.handle(completion, &mut self.session) {
                        println!();
                        println!("{}", render::notice(&notice));
                        if notice == Notice::RecommendationReady && self.session.is_authenticated() {
                            if let Some(result) = self.controller.last_result() {
                                println!("{}", render::recommendation(result));
                            }
                        }
                        prompt(&self);
                    }
                }
            }
        }

        tracing::debug!("shell exited");
        Ok(())
    }

    async fn dispatch(&mut self, line: &str) -> Flow {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Flow::Continue,
            Err(msg) => {
                println!("{msg}");
                return Flow::Continue;
            }
        };

        match command {
            Command::Login { identifier, secret } => {
                match self.session.login(&identifier, &secret).await {
                    Ok(_) => {
                        self.controller.reset();
                        println!("Logged in as {identifier}.");
                    }
                    Err(err) => println!("Login failed: {err}"),
                }
            }
            Command::Register { identifier, secret } => {
                match self.session.register(&identifier, &secret).await {
                    Ok(_) => {
                        self.controller.reset();
                        println!("Registered and logged in as {identifier}.");
                    }
                    Err(err) => println!("Registration failed: {err}"),
                }
            }
            Command::Logout => {
                self.session.clear();
                self.controller.reset();
                println!("Logged out.");
            }
            Command::Symbol(symbol) => {
                self.controller.set_symbol(&symbol);
                println!("Symbol set to {}.", self.controller.query().symbol());
            }
            Command::Interval(timeframe) => {
                self.controller.set_timeframe(timeframe);
                println!("Interval set to {timeframe}.");
            }
            Command::Fetch => match self.controller.request_fetch(&self.session) {
                Ok(Dispatch::Started(_)) => {
                    println!("Analyzing {}...", self.controller.query().symbol())
                }
                Ok(Dispatch::AlreadyPending) => println!("Still analyzing; please wait."),
                Err(err) => print_intent_error(&err),
            },
            Command::Favorite(symbol) => {
                let res = match symbol {
                    Some(symbol) => self.controller.request_favorite_symbol(&self.session, &symbol),
                    None => self.controller.request_favorite(&self.session),
                };
                if let Err(err) = res {
                    print_intent_error(&err);
                }
            }
            Command::Favorites => {
                if let Err(err) = self.controller.request_favorites(&self.session) {
                    print_intent_error(&err);
                }
            }
            Command::Me => match self.session.current() {
                None => print_intent_error(&IntentError::Unauthenticated),
                Some(credential) => match self.api.profile(&credential).await {
                    Ok(profile) => println!("Logged in as {}.", profile.email),
                    Err(err) if err.is_unauthenticated() => {
                        self.session.clear();
                        self.controller.reset();
                        println!("Your session has expired. Please log in again.");
                    }
                    Err(err) => println!("Could not load profile: {err}"),
                },
            },
            Command::Status => println!("{}", render::status(&self.session, &self.controller)),
            Command::Help => println!("{HELP}"),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }
}

fn print_intent_error(err: &IntentError) {
    println!("{err}");
}

fn prompt(shell: &Shell) {
    let who = shell.session.identity().unwrap_or("guest");
    print!("[{who}] {} {}> ", shell.controller.query().symbol(), shell.controller.query().timeframe);
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_intents() {
        assert_eq!(
            parse_command("login ana@example.com hunter2"),
            Ok(Some(Command::Login {
                identifier: "ana@example.com".into(),
                secret: "hunter2".into()
            }))
        );
        assert_eq!(
            parse_command("interval 30m"),
            Ok(Some(Command::Interval(Timeframe::ThirtyMinutes)))
        );
        assert_eq!(parse_command("FETCH"), Ok(Some(Command::Fetch)));
        assert_eq!(
            parse_command("favorite ethusdt"),
            Ok(Some(Command::Favorite(Some("ethusdt".into()))))
        );
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_command("login onlyuser").is_err());
        assert!(parse_command("interval 4h")
            .unwrap_err()
            .contains("unknown timeframe"));
        assert!(parse_command("symbol").is_err());
        assert!(parse_command("launch rockets").is_err());
    }
}
