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

use crate::backend::{BackendError, ContentService, PlaylistStore};
use crate::models::PlaylistRef;
use log::{debug, error, info, warn};
use std::sync::Arc;

pub const DEFAULT_PLAYLIST_NAME: &str = "Swipetune Likes";
pub const DEFAULT_PLAYLIST_DESCRIPTION: &str = "Songs you swiped right on in Swipetune";

/// Shown when the default playlist cannot be looked up or created.
pub const LIBRARY_UNAVAILABLE_MESSAGE: &str = "Couldn't prepare your library. Please try again.";

/// What to do when the remote playlist was created but its reference could not be saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistFailurePolicy {
    /// Return the new playlist anyway. The next reconciliation will not find
    /// it and will create another one.
    #[default]
    KeepRemote,
    /// Delete the remote playlist again and report the persistence error.
    RollbackRemote,
}

/// Makes sure a user has exactly one default playlist across the backend
/// database and Spotify.
///
/// Calls for the same owner are not serialized here. Two concurrent calls
/// can both see "no default" and both create a playlist.
pub struct DefaultPlaylistReconciler {
    store: Arc<dyn PlaylistStore>,
    content: Arc<dyn ContentService>,
    policy: PersistFailurePolicy,
}

impl DefaultPlaylistReconciler {
    pub fn new(store: Arc<dyn PlaylistStore>, content: Arc<dyn ContentService>) -> Self {
        Self {
            store,
            content,
            policy: PersistFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PersistFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the owner's default playlist, creating it on Spotify if needed.
    ///
    /// `owner_id` is the backend user id; `remote_owner_id` is the Spotify user id.
    pub async fn ensure_default(
        &self,
        owner_id: &str,
        remote_owner_id: &str,
    ) -> Result<PlaylistRef, BackendError> {
        if let Some(existing) = self.store.find_default(owner_id).await? {
            debug!("Default playlist already present for {}: {}", owner_id, existing);
            return Ok(existing);
        }

        info!("No default playlist for {}, creating one", owner_id);
        let remote = self
            .content
            .create_playlist(
                remote_owner_id,
                DEFAULT_PLAYLIST_NAME,
                DEFAULT_PLAYLIST_DESCRIPTION,
                false,
            )
            .await?;

        let row = PlaylistRef::default_for(owner_id, &remote);
        match self.store.insert(&row).await {
            Ok(()) => {
                info!("Saved default playlist {} for {}", row.remote_id, owner_id);
                Ok(row)
            }
            Err(e) => self.on_persist_failure(row, e).await,
        }
    }

    /// Forgets the owner's default playlist. The Spotify playlist itself is kept.
    pub async fn reset_default(&self, owner_id: &str) -> Result<(), BackendError> {
        info!("Resetting default playlist for {}", owner_id);
        self.store.delete_default(owner_id).await
    }

    async fn on_persist_failure(
        &self,
        row: PlaylistRef,
        err: BackendError,
    ) -> Result<PlaylistRef, BackendError> {
        match self.policy {
            PersistFailurePolicy::KeepRemote => {
                warn!(
                    "Created playlist {} but could not save it ({}); it will not be found next time",
                    row.remote_id, err
                );
                Ok(row)
            }
            PersistFailurePolicy::RollbackRemote => {
                warn!(
                    "Could not save playlist {} ({}), deleting it from Spotify",
                    row.remote_id, err
                );
                if let Err(delete_err) = self.content.delete_playlist(&row.remote_id).await {
                    error!(
                        "Rollback of playlist {} failed: {}",
                        row.remote_id, delete_err
                    );
                }
                Err(err)
            }
        }
    }
}
