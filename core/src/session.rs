/*
    swipetune | Swipe-to-like music discovery client core.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::config::PollConfig;
use crate::models::{AuthState, Session, TokenPair, UserInfo};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const GENERIC_AUTH_FAILURE: &str = "Authentication failed";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing access or refresh token in callback")]
    MissingTokens,
    #[error("Failed to establish session")]
    SessionTimeout,
    #[error("Authentication was cancelled")]
    Cancelled,
    #[error("Already signed in; sign out first")]
    AlreadySignedIn,
    #[error("Could not store the Spotify token: {0}")]
    TokenStorage(String),
    #[error("{0}")]
    Provider(String),
}

impl AuthError {
    /// Wraps a provider failure, falling back to a generic message when it has none.
    pub fn provider(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::Provider(GENERIC_AUTH_FAILURE.to_string())
        } else {
            Self::Provider(message)
        }
    }
}

/// The auth service that owns sessions (GoTrue, in production).
#[async_trait]
pub trait AuthSessionProvider: Send + Sync {
    /// Starts importing a session from a token pair. May complete in the background.
    async fn import_session(&self, access_token: &str, refresh_token: &str)
        -> Result<(), AuthError>;
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;
    async fn current_user(&self) -> Result<Option<UserInfo>, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    NotStarted,
    Importing,
    Polling { attempt: u32 },
    Established,
    TimedOut,
    Cancelled,
    Failed,
}

/// Waits for an imported session to show up.
///
/// The provider's import has no completion hook, so the session accessor is
/// read up to `max_attempts` times with `interval` between reads.
pub struct SessionPoller {
    interval: Duration,
    max_attempts: u32,
    cancel: CancellationToken,
    state: watch::Sender<PollState>,
}

impl SessionPoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        let (state, _) = watch::channel(PollState::NotStarted);
        Self {
            interval,
            max_attempts,
            cancel: CancellationToken::new(),
            state,
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.interval, config.max_attempts)
    }

    /// Stops any in-progress wait as soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Imports `tokens` into the provider and waits for the session.
    pub async fn establish(
        &self,
        provider: &dyn AuthSessionProvider,
        tokens: &TokenPair,
    ) -> Result<Session, AuthError> {
        let (Some(access), Some(refresh)) = (&tokens.access_token, &tokens.refresh_token) else {
            self.transition(PollState::Failed);
            return Err(AuthError::MissingTokens);
        };

        self.transition(PollState::Importing);
        if let Err(e) = provider.import_session(access, refresh).await {
            self.transition(PollState::Failed);
            return Err(e);
        }

        let result = self.wait_for_session(provider).await;
        self.transition(match &result {
            Ok(_) => PollState::Established,
            Err(AuthError::SessionTimeout) => PollState::TimedOut,
            Err(AuthError::Cancelled) => PollState::Cancelled,
            Err(_) => PollState::Failed,
        });
        result
    }

    /// Like [`SessionPoller::establish`], folded into the UI state.
    pub async fn establish_state(
        &self,
        provider: &dyn AuthSessionProvider,
        tokens: &TokenPair,
    ) -> AuthState {
        match self.establish(provider, tokens).await {
            Ok(session) => AuthState::Success {
                user_id: session.user_id,
            },
            Err(e) => AuthState::error(e.to_string()),
        }
    }

    async fn wait_for_session(
        &self,
        provider: &dyn AuthSessionProvider,
    ) -> Result<Session, AuthError> {
        for attempt in 1..=self.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(AuthError::Cancelled);
            }
            self.transition(PollState::Polling { attempt });

            if let Some(session) = provider.current_session().await? {
                if session.user_id.is_empty() {
                    warn!("Session established without a user id");
                }
                info!("Session established after {} attempt(s)", attempt);
                return Ok(session);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(AuthError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        warn!(
            "No session after {} attempts ({:?} apart)",
            self.max_attempts, self.interval
        );
        Err(AuthError::SessionTimeout)
    }

    fn transition(&self, next: PollState) {
        let previous = self.state.send_replace(next);
        debug!("Session poll: {:?} -> {:?}", previous, next);
    }
}

impl Default for SessionPoller {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}
