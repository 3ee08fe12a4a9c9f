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

use crate::callback::CallbackParams;
use crate::models::{AuthState, Session};
use crate::session::{AuthError, AuthSessionProvider, SessionPoller};
use crate::token_cache::TokenCache;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;

/// Drives login from the deep-link callback to an established session.
///
/// State transitions:
/// 1. `Idle`/`Error` -> `Loading` when login starts or a callback arrives.
/// 2. `Loading` -> `Success` once the session is established and the
///    Spotify token is cached, `Error` otherwise.
/// 3. Back to `Idle` only through [`AuthFlow::reset`] or [`AuthFlow::sign_out`].
///
/// Login attempts while in `Success` are ignored and leave the state alone.
pub struct AuthFlow {
    provider: Arc<dyn AuthSessionProvider>,
    cache: TokenCache,
    poller: SessionPoller,
    state: watch::Sender<AuthState>,
}

impl AuthFlow {
    pub fn new(
        provider: Arc<dyn AuthSessionProvider>,
        cache: TokenCache,
        poller: SessionPoller,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Idle);
        Self {
            provider,
            cache,
            poller,
            state,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn poller(&self) -> &SessionPoller {
        &self.poller
    }

    /// The user left for the browser.
    pub fn start_login(&self) -> AuthState {
        if self.is_signed_in() {
            warn!("Login started while already signed in; ignoring");
            return self.state();
        }
        self.set(AuthState::Loading)
    }

    /// Handles the callback URL and returns the resulting UI state.
    pub async fn handle_callback(&self, url: &str) -> AuthState {
        match self.complete_callback(url).await {
            Ok(session) => self.set(AuthState::Success {
                user_id: session.user_id,
            }),
            Err(AuthError::AlreadySignedIn) => self.state(),
            Err(e) => self.set(AuthState::error(e.to_string())),
        }
    }

    /// Like [`AuthFlow::handle_callback`], but hands back the session itself.
    pub async fn complete_callback(&self, url: &str) -> Result<Session, AuthError> {
        if self.is_signed_in() {
            warn!("Callback received while already signed in; ignoring");
            return Err(AuthError::AlreadySignedIn);
        }
        self.set(AuthState::Loading);

        let params = CallbackParams::parse(url);
        let Some(tokens) = params.token_pair() else {
            let err = match params.error_message() {
                Some(message) => AuthError::provider(message),
                None => AuthError::MissingTokens,
            };
            warn!("Callback rejected: {}", err);
            self.set(AuthState::error(err.to_string()));
            return Err(err);
        };

        let session = match self.poller.establish(self.provider.as_ref(), &tokens).await {
            Ok(session) => session,
            Err(e) => {
                self.set(AuthState::error(e.to_string()));
                return Err(e);
            }
        };

        match session.provider_tokens().or_else(|| params.provider_tokens()) {
            Some(pair) => {
                if let Err(e) = self.cache.set_pair(pair).await {
                    error!("Could not cache Spotify token: {}", e);
                    let err = AuthError::TokenStorage(e.to_string());
                    self.set(AuthState::error(err.to_string()));
                    return Err(err);
                }
            }
            None => warn!("Session for {} carries no Spotify token", session.user_id),
        }

        info!("Signed in as {}", session.user_id);
        self.set(AuthState::Success {
            user_id: session.user_id.clone(),
        });
        Ok(session)
    }

    pub fn reset(&self) -> AuthState {
        self.set(AuthState::Idle)
    }

    /// Signs out of the auth provider and forgets the cached Spotify token.
    ///
    /// A failed remote sign-out is logged; the local state is cleared regardless.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        if let Err(e) = self.provider.sign_out().await {
            warn!("Remote sign-out failed: {}", e);
        }
        let cleared = self
            .cache
            .clear()
            .await
            .map_err(|e| AuthError::TokenStorage(e.to_string()));
        self.set(AuthState::Idle);
        cleared
    }

    fn is_signed_in(&self) -> bool {
        matches!(*self.state.borrow(), AuthState::Success { .. })
    }

    fn set(&self, next: AuthState) -> AuthState {
        self.state.send_replace(next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenPair;
    use crate::session::tests::FakeProvider;
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    async fn ready_cache() -> TokenCache {
        let cache = TokenCache::new();
        cache.initialize(Arc::new(MemoryStore::new())).await;
        cache
    }

    fn flow(provider: Arc<FakeProvider>, cache: TokenCache) -> AuthFlow {
        AuthFlow::new(
            provider,
            cache,
            SessionPoller::new(Duration::from_millis(100), 20),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_success_caches_session_provider_token() {
        let provider = Arc::new(FakeProvider::ready_after(2, "user-1"));
        let cache = ready_cache().await;
        let flow = flow(provider.clone(), cache.clone());

        let state = flow
            .handle_callback("swipetune://login-callback#access_token=abc&refresh_token=xyz")
            .await;

        assert_eq!(
            state,
            AuthState::Success {
                user_id: "user-1".to_string()
            }
        );
        assert_eq!(flow.state(), state);
        assert_eq!(cache.access_token().as_deref(), Some("sp"));
        assert_eq!(
            provider.imported.lock().unwrap().clone(),
            Some(("abc".to_string(), "xyz".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_falls_back_to_fragment_provider_token() {
        let mut provider = FakeProvider::ready_after(0, "user-1");
        provider.session.provider_token = None;
        let cache = ready_cache().await;
        let flow = flow(Arc::new(provider), cache.clone());

        flow.handle_callback(
            "app://cb#access_token=a&refresh_token=r&provider_token=sp2&provider_refresh_token=spr2",
        )
        .await;

        assert_eq!(cache.tokens(), TokenPair::new("sp2", "spr2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_callback_shows_provider_message() {
        let provider = Arc::new(FakeProvider::ready_after(0, "user-1"));
        let flow = flow(provider.clone(), ready_cache().await);

        let state = flow
            .handle_callback("app://cb#error=access_denied&error_description=User+denied+access")
            .await;

        assert_eq!(state, AuthState::error("User denied access"));
        assert!(provider.imported.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_without_tokens() {
        let provider = Arc::new(FakeProvider::ready_after(0, "user-1"));
        let flow = flow(provider, ready_cache().await);

        let state = flow.handle_callback("app://cb").await;

        assert_eq!(
            state,
            AuthState::error("Missing access or refresh token in callback")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_session_timeout() {
        let provider = Arc::new(FakeProvider::never_ready());
        let cache = ready_cache().await;
        let flow = flow(provider, cache.clone());

        let state = flow
            .handle_callback("app://cb#access_token=a&refresh_token=r")
            .await;

        assert_eq!(state, AuthState::error("Failed to establish session"));
        assert!(!cache.has_token());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uninitialized_cache_fails_login() {
        let provider = Arc::new(FakeProvider::ready_after(0, "user-1"));
        let flow = flow(provider, TokenCache::new());

        let result = flow
            .complete_callback("app://cb#access_token=a&refresh_token=r")
            .await;

        assert!(matches!(result, Err(AuthError::TokenStorage(_))));
        assert!(matches!(flow.state(), AuthState::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_after_success_keeps_session() {
        let provider = Arc::new(FakeProvider::ready_after(0, "user-1"));
        let cache = ready_cache().await;
        let flow = flow(provider.clone(), cache.clone());
        flow.handle_callback("app://cb#access_token=a&refresh_token=r").await;

        let replay = flow
            .complete_callback("app://cb#access_token=b&refresh_token=s")
            .await;
        let state = flow.handle_callback("app://cb#error=access_denied").await;

        assert_eq!(replay, Err(AuthError::AlreadySignedIn));
        let signed_in = AuthState::Success {
            user_id: "user-1".to_string(),
        };
        assert_eq!(state, signed_in);
        assert_eq!(flow.start_login(), signed_in);
        assert_eq!(flow.state(), signed_in);
        assert_eq!(
            provider.imported.lock().unwrap().clone(),
            Some(("a".to_string(), "r".to_string()))
        );

        flow.reset();
        assert_eq!(flow.start_login(), AuthState::Loading);
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache_and_resets_state() {
        let provider = Arc::new(FakeProvider::ready_after(0, "user-1"));
        let cache = ready_cache().await;
        cache.set_pair(TokenPair::new("sp", "spr")).await.unwrap();
        let flow = flow(provider.clone(), cache.clone());
        flow.start_login();
        assert_eq!(flow.state(), AuthState::Loading);

        flow.sign_out().await.unwrap();

        assert_eq!(flow.state(), AuthState::Idle);
        assert!(!cache.has_token());
        assert_eq!(provider.signed_out.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_state() {
        let provider = Arc::new(FakeProvider::ready_after(0, "user-1"));
        let flow = flow(provider, ready_cache().await);
        let mut rx = flow.subscribe();

        flow.start_login();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AuthState::Loading);

        flow.reset();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AuthState::Idle);
    }
}
