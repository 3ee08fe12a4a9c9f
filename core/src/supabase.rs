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

use crate::backend::{BackendError, PlaylistStore};
use crate::models::{PlaylistRef, Session, UserInfo};
use crate::network::{ApiClient, NetworkError};
use crate::session::{AuthError, AuthSessionProvider};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::RequestBuilder;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

const PLAYLISTS_TABLE: &str = "playlists";

fn trimmed(base: &Url) -> String {
    base.as_str().trim_end_matches('/').to_string()
}

#[derive(Debug, Clone, Default)]
enum ImportState {
    #[default]
    Empty,
    Pending,
    Ready(Session),
    Failed(String),
}

/// Import state tagged with the import that produced it.
#[derive(Debug, Default)]
struct Imports {
    generation: u64,
    state: ImportState,
}

/// GoTrue-backed session provider.
///
/// `import_session` returns immediately; the user lookup that turns the
/// tokens into a session runs on a background task. A later import or a
/// sign-out supersedes any lookup still in flight.
pub struct SupabaseAuth {
    base_url: String,
    anon_key: String,
    client: ApiClient,
    imports: Arc<RwLock<Imports>>,
}

impl SupabaseAuth {
    pub fn new(base_url: &Url, anon_key: impl Into<String>) -> Self {
        Self::with_client(base_url, anon_key, ApiClient::new())
    }

    pub fn with_client(base_url: &Url, anon_key: impl Into<String>, client: ApiClient) -> Self {
        Self {
            base_url: trimmed(base_url),
            anon_key: anon_key.into(),
            client,
            imports: Arc::new(RwLock::new(Imports::default())),
        }
    }

    /// Browser URL that starts the Spotify OAuth flow and redirects back to `redirect_uri`.
    pub fn authorize_url(&self, redirect_uri: &str, scopes: &[&str]) -> Result<Url, AuthError> {
        let scopes = scopes.join(" ");
        Url::parse_with_params(
            &format!("{}/auth/v1/authorize", self.base_url),
            &[
                ("provider", "spotify"),
                ("redirect_to", redirect_uri),
                ("scopes", scopes.as_str()),
            ],
        )
        .map_err(|e| AuthError::provider(e.to_string()))
    }

    fn authed(&self, request: RequestBuilder, access_token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }

    async fn fetch_user(
        client: &ApiClient,
        request: RequestBuilder,
    ) -> Result<UserInfo, NetworkError> {
        client.execute_json::<UserInfo>(request).await
    }
}

#[async_trait]
impl AuthSessionProvider for SupabaseAuth {
    async fn import_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), AuthError> {
        let generation = {
            let mut imports = self.imports.write().await;
            imports.generation += 1;
            imports.state = ImportState::Pending;
            imports.generation
        };

        let request = self.authed(
            self.client
                .http()
                .get(format!("{}/auth/v1/user", self.base_url)),
            access_token,
        );
        let client = self.client.clone();
        let imports = Arc::clone(&self.imports);
        let access_token = access_token.to_string();
        let refresh_token = refresh_token.to_string();

        tokio::spawn(async move {
            let next = match Self::fetch_user(&client, request).await {
                Ok(user) => {
                    info!("Imported session for user {}", user.id);
                    ImportState::Ready(Session {
                        user_id: user.id,
                        access_token,
                        refresh_token,
                        provider_token: None,
                        provider_refresh_token: None,
                    })
                }
                Err(e) => {
                    warn!("Session import failed: {}", e);
                    ImportState::Failed(e.to_string())
                }
            };
            let mut imports = imports.write().await;
            if imports.generation == generation {
                imports.state = next;
            } else {
                debug!("Discarding superseded session import");
            }
        });

        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        match &self.imports.read().await.state {
            ImportState::Ready(session) => Ok(Some(session.clone())),
            ImportState::Failed(message) => Err(AuthError::provider(message.clone())),
            ImportState::Empty | ImportState::Pending => Ok(None),
        }
    }

    async fn current_user(&self) -> Result<Option<UserInfo>, AuthError> {
        let Some(session) = self.current_session().await? else {
            return Ok(None);
        };
        let request = self.authed(
            self.client
                .http()
                .get(format!("{}/auth/v1/user", self.base_url)),
            &session.access_token,
        );
        Self::fetch_user(&self.client, request)
            .await
            .map(Some)
            .map_err(|e| AuthError::provider(e.to_string()))
    }

    /// Drops the local session first, then revokes it remotely.
    async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = {
            let mut imports = self.imports.write().await;
            imports.generation += 1;
            std::mem::take(&mut imports.state)
        };
        let ImportState::Ready(session) = previous else {
            debug!("sign_out without an active session");
            return Ok(());
        };

        let request = self.authed(
            self.client
                .http()
                .post(format!("{}/auth/v1/logout", self.base_url)),
            &session.access_token,
        );
        self.client
            .execute(request)
            .await
            .map(|_| ())
            .map_err(|e| AuthError::provider(e.to_string()))
    }
}

/// Playlist rows in the Supabase `playlists` table, accessed as the signed-in user.
pub struct PostgrestPlaylists {
    table_url: String,
    anon_key: String,
    access_token: String,
    client: ApiClient,
}

impl PostgrestPlaylists {
    pub fn new(base_url: &Url, anon_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::with_client(base_url, anon_key, access_token, ApiClient::new())
    }

    pub fn with_client(
        base_url: &Url,
        anon_key: impl Into<String>,
        access_token: impl Into<String>,
        client: ApiClient,
    ) -> Self {
        Self {
            table_url: format!("{}/rest/v1/{}", trimmed(base_url), PLAYLISTS_TABLE),
            anon_key: anon_key.into(),
            access_token: access_token.into(),
            client,
        }
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
    }

    fn default_filter(owner_id: &str) -> [(&'static str, String); 2] {
        [
            ("user_id", format!("eq.{}", owner_id)),
            ("is_default", "eq.true".to_string()),
        ]
    }
}

#[async_trait]
impl PlaylistStore for PostgrestPlaylists {
    async fn find_default(&self, owner_id: &str) -> Result<Option<PlaylistRef>, BackendError> {
        let request = self.authed(
            self.client
                .http()
                .get(&self.table_url)
                .query(&Self::default_filter(owner_id))
                .query(&[("select", "*"), ("limit", "1")]),
        );
        let rows: Vec<PlaylistRef> = self.client.execute_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, playlist: &PlaylistRef) -> Result<(), BackendError> {
        let request = self.authed(
            self.client
                .http()
                .post(&self.table_url)
                .header("Prefer", "return=minimal")
                .json(playlist),
        );
        self.client.execute(request).await?;
        Ok(())
    }

    async fn delete_default(&self, owner_id: &str) -> Result<(), BackendError> {
        let request = self.authed(
            self.client
                .http()
                .delete(&self.table_url)
                .query(&Self::default_filter(owner_id)),
        );
        self.client.execute(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenPair;
    use crate::session::SessionPoller;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn base(server: &MockServer) -> Url {
        Url::parse(&server.uri()).unwrap()
    }

    fn row(id: &str) -> PlaylistRef {
        PlaylistRef {
            remote_id: id.to_string(),
            display_name: "Swipetune Likes".to_string(),
            external_url: None,
            owner_id: "u1".to_string(),
            is_default: true,
        }
    }

    #[tokio::test]
    async fn test_import_session_completes_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer abc"))
            .and(header("apikey", "anon"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "user-1", "email": "a@b.c"}))
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;

        let auth = SupabaseAuth::new(&base(&server), "anon");
        let poller = SessionPoller::new(Duration::from_millis(50), 40);

        let session = poller
            .establish(&auth, &TokenPair::new("abc", "xyz"))
            .await
            .unwrap();

        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.refresh_token, "xyz");
    }

    #[tokio::test]
    async fn test_rejected_import_surfaces_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"msg": "invalid JWT"})),
            )
            .mount(&server)
            .await;

        let auth = SupabaseAuth::new(&base(&server), "anon");
        let poller = SessionPoller::new(Duration::from_millis(20), 50);

        let err = poller
            .establish(&auth, &TokenPair::new("bad", "bad"))
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::Provider("Unauthorized: invalid JWT".to_string()));
    }

    #[tokio::test]
    async fn test_sign_out_revokes_and_forgets_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "u1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let auth = SupabaseAuth::new(&base(&server), "anon");
        SessionPoller::new(Duration::from_millis(20), 50)
            .establish(&auth, &TokenPair::new("abc", "xyz"))
            .await
            .unwrap();
        assert_eq!(auth.current_user().await.unwrap().unwrap().id, "u1");

        auth.sign_out().await.unwrap();

        assert_eq!(auth.current_session().await.unwrap(), None);
        assert_eq!(auth.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_out_during_pending_import_stays_signed_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "user-1"}))
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;

        let auth = SupabaseAuth::new(&base(&server), "anon");
        auth.import_session("abc", "xyz").await.unwrap();
        auth.sign_out().await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(auth.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_later_import_wins_over_slow_earlier_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer first"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "user-old"}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer second"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "user-new"})))
            .mount(&server)
            .await;

        let auth = SupabaseAuth::new(&base(&server), "anon");
        auth.import_session("first", "r1").await.unwrap();
        auth.import_session("second", "r2").await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let session = auth.current_session().await.unwrap().unwrap();
        assert_eq!(session.user_id, "user-new");
        assert_eq!(session.refresh_token, "r2");
    }

    #[test]
    fn test_authorize_url_carries_provider_and_redirect() {
        let auth = SupabaseAuth::new(&Url::parse("https://abc.supabase.co/").unwrap(), "anon");
        let url = auth
            .authorize_url("swipetune://login-callback", &["user-read-email", "playlist-modify-private"])
            .unwrap();

        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".to_string(), "spotify".to_string())));
        assert!(pairs.contains(&(
            "redirect_to".to_string(),
            "swipetune://login-callback".to_string()
        )));
        assert!(pairs.contains(&(
            "scopes".to_string(),
            "user-read-email playlist-modify-private".to_string()
        )));
    }

    #[tokio::test]
    async fn test_find_default_reads_first_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/playlists"))
            .and(query_param("user_id", "eq.u1"))
            .and(query_param("is_default", "eq.true"))
            .and(header("authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![row("p1")]))
            .mount(&server)
            .await;

        let store = PostgrestPlaylists::new(&base(&server), "anon", "user-jwt");
        assert_eq!(store.find_default("u1").await.unwrap(), Some(row("p1")));
    }

    #[tokio::test]
    async fn test_find_default_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/playlists"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let store = PostgrestPlaylists::new(&base(&server), "anon", "user-jwt");
        assert_eq!(store.find_default("u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_posts_row_and_maps_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/playlists"))
            .and(body_json(serde_json::to_value(row("p1")).unwrap()))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/playlists"))
            .respond_with(ResponseTemplate::new(409).set_body_json(
                serde_json::json!({"code": "23505", "message": "duplicate key value"}),
            ))
            .mount(&server)
            .await;

        let store = PostgrestPlaylists::new(&base(&server), "anon", "user-jwt");
        store.insert(&row("p1")).await.unwrap();

        let err = store.insert(&row("p2")).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("409"));
        assert!(err.message.contains("duplicate key value"));
    }

    #[tokio::test]
    async fn test_delete_default_filters_by_owner() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/playlists"))
            .and(query_param("user_id", "eq.u1"))
            .and(query_param("is_default", "eq.true"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = PostgrestPlaylists::new(&base(&server), "anon", "user-jwt");
        store.delete_default("u1").await.unwrap();
    }
}
