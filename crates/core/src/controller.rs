//! Recommendation request controller.
//!
//! The controller is driven by a single event loop: intents (`request_fetch`,
//! `request_favorite`, query edits) are applied synchronously, network work runs on spawned
//! tasks, and each task reports back exactly one [`Completion`] which the loop feeds to
//! [`RecommendationController::handle`]. The `Pending` check in `request_fetch` happens
//! before anything is spawned, so a second fetch can never overlap the first.
//!
//! Request state belongs to the credential it was issued under. Once the session moves on
//! (logout, expiry, another login) that state is discarded and late completions carrying the
//! old credential are dropped without touching the new session.

use crate::api::{ApiError, FavoriteError, InvestApi, RecommendationError};
use crate::domain::credential::Credential;
use crate::domain::recommendation::{
    normalize_symbol, RecommendationQuery, RecommendationResult, Timeframe,
};
use crate::session::SessionStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum FetchState {
    Idle,
    Pending {
        request_id: Uuid,
        query: RecommendationQuery,
    },
    Succeeded(RecommendationResult),
    Failed(RecommendationError),
}

impl FetchState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// Outcome of an accepted fetch intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started(Uuid),
    /// A fetch is already in flight; nothing was sent.
    AlreadyPending,
}

/// Intents rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("please log in first")]
    Unauthenticated,

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Result of a spawned network task, delivered back to the event loop. Each carries the
/// credential the request was sent with.
#[derive(Debug)]
pub enum Completion {
    Fetch {
        credential: Credential,
        request_id: Uuid,
        outcome: Result<RecommendationResult, RecommendationError>,
    },
    Favorite {
        credential: Credential,
        symbol: String,
        outcome: Result<(), FavoriteError>,
    },
    Favorites {
        credential: Credential,
        outcome: Result<Vec<String>, FavoriteError>,
    },
}

impl Completion {
    pub fn credential(&self) -> &Credential {
        match self {
            Self::Fetch { credential, .. }
            | Self::Favorite { credential, .. }
            | Self::Favorites { credential, .. } => credential,
        }
    }
}

/// What the view should tell the user after a completion was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    RecommendationReady,
    FetchFailed(RecommendationError),
    /// The backend rejected the credential; the session has been cleared.
    SessionExpired,
    FavoriteSaved(String),
    FavoriteFailed {
        symbol: String,
        error: FavoriteError,
    },
    FavoritesLoaded(Vec<String>),
    FavoritesFailed(FavoriteError),
}

pub struct RecommendationController {
    api: Arc<dyn InvestApi>,
    query: RecommendationQuery,
    state: FetchState,
    last_result: Option<RecommendationResult>,
    /// Credential that `state` and `last_result` belong to.
    owner: Option<Credential>,
    timeout: Duration,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl RecommendationController {
    pub fn new(api: Arc<dyn InvestApi>, query: RecommendationQuery, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            api,
            query,
            state: FetchState::Idle,
            last_result: None,
            owner: None,
            timeout,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn query(&self) -> &RecommendationQuery {
        &self.query
    }

    /// The last successful result. Stays visible across query edits, while a newer fetch is
    /// pending and after a failed one; dropped when the session ends.
    pub fn last_result(&self) -> Option<&RecommendationResult> {
        self.last_result.as_ref()
    }

    /// Forgets all request state of the current session. In-flight requests still complete
    /// but their results are ignored. The query is kept.
    pub fn reset(&mut self) {
        if self.state.is_pending() || self.last_result.is_some() {
            tracing::info!("discarding request state of the previous session");
        }
        self.state = FetchState::Idle;
        self.last_result = None;
        self.owner = None;
    }

    /// Resets when the session no longer holds the credential the current state belongs to.
    fn follow_session(&mut self, session: &SessionStore) {
        if self.owner.is_some() && self.owner != session.current() {
            self.reset();
        }
    }

    pub fn set_symbol(&mut self, symbol: &str) {
        self.query.set_symbol(symbol);
    }

    pub fn set_timeframe(&mut self, timeframe: Timeframe) {
        self.query.timeframe = timeframe;
    }

    pub fn request_fetch(&mut self, session: &SessionStore) -> Result<Dispatch, IntentError> {
        self.follow_session(session);
        let Some(credential) = session.current() else {
            tracing::info!("fetch rejected: no session");
            return Err(IntentError::Unauthenticated);
        };

        if self.state.is_pending() {
            tracing::debug!("fetch already pending; ignoring duplicate request");
            return Ok(Dispatch::AlreadyPending);
        }

        if !self.query.is_complete() {
            return Err(IntentError::InvalidQuery(
                "symbol must be non-empty".to_string(),
            ));
        }

        let request_id = Uuid::new_v4();
        let query = self.query.clone();
        self.state = FetchState::Pending {
            request_id,
            query: query.clone(),
        };
        self.owner = Some(credential.clone());

        tracing::info!(%request_id, symbol = %query.symbol(), interval = %query.timeframe, "fetch started");

        let api = Arc::clone(&self.api);
        let issued_with = credential.clone();
        let work = async move {
            let outcome = api.fetch_recommendation(&credential, &query).await;
            Completion::Fetch {
                credential,
                request_id,
                outcome,
            }
        };
        self.spawn(work, move || Completion::Fetch {
            credential: issued_with,
            request_id,
            outcome: Err(timed_out()),
        });

        Ok(Dispatch::Started(request_id))
    }

    /// Favorites the current symbol. Does not touch the fetch state.
    pub fn request_favorite(&mut self, session: &SessionStore) -> Result<(), IntentError> {
        let symbol = self.query.symbol().to_string();
        self.request_favorite_symbol(session, &symbol)
    }

    pub fn request_favorite_symbol(
        &mut self,
        session: &SessionStore,
        symbol: &str,
    ) -> Result<(), IntentError> {
        self.follow_session(session);
        let Some(credential) = session.current() else {
            tracing::info!("favorite rejected: no session");
            return Err(IntentError::Unauthenticated);
        };

        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(IntentError::InvalidQuery(
                "symbol must be non-empty".to_string(),
            ));
        }

        tracing::info!(%symbol, "favorite requested");
        self.owner = Some(credential.clone());

        let api = Arc::clone(&self.api);
        let issued_with = credential.clone();
        let timed_out_symbol = symbol.clone();
        let work = async move {
            let outcome = api.add_favorite(&credential, &symbol).await;
            Completion::Favorite {
                credential,
                symbol,
                outcome,
            }
        };
        self.spawn(work, move || Completion::Favorite {
            credential: issued_with,
            symbol: timed_out_symbol,
            outcome: Err(timed_out()),
        });
        Ok(())
    }

    pub fn request_favorites(&mut self, session: &SessionStore) -> Result<(), IntentError> {
        self.follow_session(session);
        let Some(credential) = session.current() else {
            tracing::info!("favorites listing rejected: no session");
            return Err(IntentError::Unauthenticated);
        };

        tracing::info!("favorites listing requested");
        self.owner = Some(credential.clone());

        let api = Arc::clone(&self.api);
        let issued_with = credential.clone();
        let work = async move {
            let outcome = api.list_favorites(&credential).await;
            Completion::Favorites {
                credential,
                outcome,
            }
        };
        self.spawn(work, move || Completion::Favorites {
            credential: issued_with,
            outcome: Err(timed_out()),
        });
        Ok(())
    }

    fn spawn<F, T>(&self, work: F, on_timeout: T)
    where
        F: Future<Output = Completion> + Send + 'static,
        T: FnOnce() -> Completion + Send + 'static,
    {
        let tx = self.tx.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let completion = match tokio::time::timeout(timeout, work).await {
                Ok(completion) => completion,
                Err(_) => {
                    tracing::warn!(?timeout, "request timed out");
                    on_timeout()
                }
            };
            // The receiver lives in the controller; if it is gone nobody is listening.
            let _ = tx.send(completion);
        });
    }

    /// Waits for the next completion from a spawned task.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.rx.recv().await
    }

    /// Applies a completion. Returns `None` when it no longer matches the controller state or
    /// was issued under a credential the session no longer holds.
    pub fn handle(&mut self, completion: Completion, session: &mut SessionStore) -> Option<Notice> {
        self.follow_session(session);
        if session.current().as_ref() != Some(completion.credential()) {
            tracing::warn!("ignoring completion issued under a previous session");
            return None;
        }

        match completion {
            Completion::Fetch {
                request_id,
                outcome,
                ..
            } => {
                let matches_pending = matches!(
                    &self.state,
                    FetchState::Pending { request_id: pending, .. } if *pending == request_id
                );
                if !matches_pending {
                    tracing::warn!(%request_id, "ignoring completion for a request that is not pending");
                    return None;
                }

                match outcome {
                    Ok(result) => {
                        tracing::info!(
                            %request_id,
                            symbol = %result.symbol,
                            signal = %result.signal,
                            confidence = result.confidence,
                            "recommendation received"
                        );
                        self.last_result = Some(result.clone());
                        self.state = FetchState::Succeeded(result);
                        Some(Notice::RecommendationReady)
                    }
                    Err(err) => {
                        tracing::warn!(%request_id, error = %err, "recommendation fetch failed");
                        if err.is_unauthenticated() {
                            self.expire_session(session);
                            self.state = FetchState::Failed(err);
                            Some(Notice::SessionExpired)
                        } else {
                            self.state = FetchState::Failed(err.clone());
                            Some(Notice::FetchFailed(err))
                        }
                    }
                }
            }
            Completion::Favorite {
                symbol, outcome, ..
            } => match outcome {
                Ok(()) => {
                    tracing::info!(%symbol, "favorite saved");
                    Some(Notice::FavoriteSaved(symbol))
                }
                Err(ApiError::Unauthenticated) => {
                    self.expire_session(session);
                    Some(Notice::SessionExpired)
                }
                Err(error) => {
                    tracing::warn!(%symbol, %error, "favorite failed");
                    Some(Notice::FavoriteFailed { symbol, error })
                }
            },
            Completion::Favorites { outcome, .. } => match outcome {
                Ok(symbols) => Some(Notice::FavoritesLoaded(symbols)),
                Err(ApiError::Unauthenticated) => {
                    self.expire_session(session);
                    Some(Notice::SessionExpired)
                }
                Err(error) => Some(Notice::FavoritesFailed(error)),
            },
        }
    }

    fn expire_session(&mut self, session: &mut SessionStore) {
        tracing::warn!("backend rejected the credential; clearing session");
        session.clear();
        self.reset();
    }

    /// Receives and applies the next completion.
    pub async fn settle(&mut self, session: &mut SessionStore) -> Option<Notice> {
        loop {
            let completion = self.next_completion().await?;
            if let Some(notice) = self.handle(completion, session) {
                return Some(notice);
            }
        }
    }
}

fn timed_out() -> ApiError {
    ApiError::Network("no response before timeout".to_string())
}

impl std::fmt::Debug for RecommendationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationController")
            .field("query", &self.query)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
