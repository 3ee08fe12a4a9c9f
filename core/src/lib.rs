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

pub mod auth;
pub mod backend;
pub mod callback;
pub mod config;
pub mod models;
pub mod network;
pub mod reconciler;
pub mod session;
pub mod spotify;
pub mod store;
pub mod supabase;
pub mod token_cache;

// Re-export key items for convenience
pub use auth::AuthFlow;
pub use backend::{BackendError, ContentService, PlaylistStore};
pub use callback::{parse_callback, CallbackParams};
pub use config::{Config, ConfigError, PollConfig};
pub use models::{AuthState, PlaylistRef, RemotePlaylist, Session, TokenPair, UserInfo};
pub use network::{ApiClient, NetworkError};
pub use reconciler::{DefaultPlaylistReconciler, PersistFailurePolicy};
pub use session::{AuthError, AuthSessionProvider, PollState, SessionPoller};
pub use spotify::SpotifyContent;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use supabase::{PostgrestPlaylists, SupabaseAuth};
pub use token_cache::{TokenCache, TokenCacheError};
