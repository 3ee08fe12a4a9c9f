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

use crate::backend::{BackendError, ContentService};
use crate::models::RemotePlaylist;
use crate::network::{self, NetworkError};
use crate::token_cache::TokenCache;
use async_trait::async_trait;
use log::{debug, info};
use rspotify::{
    http::HttpError,
    model::{PlaylistId, UserId},
    prelude::*,
    AuthCodeSpotify, ClientError, Config, Credentials, OAuth, Token,
};
use std::sync::Arc;

/// Spotify Web API access using the provider token held in the [`TokenCache`].
pub struct SpotifyContent {
    spotify: Arc<AuthCodeSpotify>,
}

impl SpotifyContent {
    pub fn new(spotify: AuthCodeSpotify) -> Self {
        Self {
            spotify: Arc::new(spotify),
        }
    }

    /// Builds a client from the cached provider token.
    pub fn from_cache(cache: &TokenCache) -> Result<Self, BackendError> {
        Self::from_cache_with_config(cache, Config::default())
    }

    /// Like [`SpotifyContent::from_cache`] with a custom client config.
    ///
    /// Token refreshing is always turned off: refresh belongs to the auth provider.
    pub fn from_cache_with_config(
        cache: &TokenCache,
        config: Config,
    ) -> Result<Self, BackendError> {
        if !cache.has_token() {
            return Err(BackendError::new("No Spotify token cached; sign in again"));
        }
        let token = Token {
            access_token: cache.access_token().unwrap_or_default(),
            refresh_token: cache.refresh_token(),
            expires_at: None,
            ..Default::default()
        };
        let config = Config {
            token_refreshing: false,
            token_cached: false,
            ..config
        };
        let spotify = AuthCodeSpotify::from_token_with_config(
            token,
            Credentials::default(),
            OAuth::default(),
            config,
        );
        Ok(Self::new(spotify))
    }

    /// The Spotify user id behind the cached token.
    pub async fn current_user_id(&self) -> Result<String, BackendError> {
        let user = match self.spotify.current_user().await {
            Ok(user) => user,
            Err(e) => return Err(map_client_error(e).await),
        };
        debug!("Spotify user is {}", user.id.id());
        Ok(user.id.id().to_string())
    }
}

#[async_trait]
impl ContentService for SpotifyContent {
    async fn create_playlist(
        &self,
        remote_owner_id: &str,
        name: &str,
        description: &str,
        is_public: bool,
    ) -> Result<RemotePlaylist, BackendError> {
        let user_id = UserId::from_id(remote_owner_id)
            .map_err(|_| BackendError::new(format!("Invalid Spotify user id: {}", remote_owner_id)))?;

        let playlist = match self
            .spotify
            .user_playlist_create(user_id, name, Some(is_public), Some(false), Some(description))
            .await
        {
            Ok(playlist) => playlist,
            Err(e) => return Err(map_client_error(e).await),
        };

        info!("Created Spotify playlist {} ({})", playlist.name, playlist.id.id());
        Ok(RemotePlaylist {
            id: playlist.id.id().to_string(),
            name: playlist.name,
            external_url: playlist.external_urls.get("spotify").cloned(),
        })
    }

    async fn delete_playlist(&self, remote_id: &str) -> Result<(), BackendError> {
        let playlist_id = PlaylistId::from_id(remote_id)
            .map_err(|_| BackendError::new(format!("Invalid Spotify playlist id: {}", remote_id)))?;

        // Spotify has no hard delete; unfollowing removes it from the owner's library.
        if let Err(e) = self.spotify.playlist_unfollow(playlist_id).await {
            return Err(map_client_error(e).await);
        }
        info!("Unfollowed Spotify playlist {}", remote_id);
        Ok(())
    }
}

/// Runs rspotify's HTTP failures through the shared classifier.
async fn map_client_error(err: ClientError) -> BackendError {
    match err {
        ClientError::Http(http) => match *http {
            HttpError::StatusCode(response) => {
                let status = response.status().as_u16();
                let url = response.url().to_string();
                let body = response.text().await.unwrap_or_default();
                network::classify(status, &url, &body).into()
            }
            HttpError::Client(e) => NetworkError::Connection(e.to_string()).into(),
        },
        other => BackendError::new(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn cache_with_token(token: &str) -> TokenCache {
        let cache = TokenCache::new();
        cache.initialize(Arc::new(MemoryStore::new())).await;
        cache.set_tokens(Some(token.to_string()), None).await.unwrap();
        cache
    }

    fn config_for(server: &MockServer) -> Config {
        Config {
            api_base_url: format!("{}/v1/", server.uri()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_from_cache_requires_token() {
        let cache = cache_with_token("").await;
        assert!(SpotifyContent::from_cache(&cache).is_err());
    }

    #[tokio::test]
    async fn test_create_playlist_forbidden_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/users/s1/playlists"))
            .and(header("authorization", "Bearer sp-token"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                r#"{"error":{"status":403,"message":"Insufficient client scope"}}"#,
            ))
            .mount(&server)
            .await;

        let cache = cache_with_token("sp-token").await;
        let content = SpotifyContent::from_cache_with_config(&cache, config_for(&server)).unwrap();

        let err = content
            .create_playlist("s1", "Swipetune Likes", "desc", false)
            .await
            .unwrap_err();

        assert_eq!(err.code.as_deref(), Some("403"));
        assert!(err.message.contains("Insufficient client scope"));
    }

    #[tokio::test]
    async fn test_current_user_expired_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"error":{"status":401,"message":"The access token expired"}}"#,
            ))
            .mount(&server)
            .await;

        let cache = cache_with_token("stale").await;
        let content = SpotifyContent::from_cache_with_config(&cache, config_for(&server)).unwrap();

        let err = content.current_user_id().await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("401"));
        assert!(err.message.contains("The access token expired"));
    }
}
