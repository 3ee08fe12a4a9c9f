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

use crate::models::{PlaylistRef, RemotePlaylist};
use crate::network::NetworkError;
use async_trait::async_trait;
use thiserror::Error;

/// A failed call to the persistence or content backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub code: Option<String>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl From<NetworkError> for BackendError {
    fn from(err: NetworkError) -> Self {
        let code = err.status().map(|status| status.to_string());
        Self {
            message: err.to_string(),
            code,
        }
    }
}

/// Row storage for playlist references, keyed by owner.
#[async_trait]
pub trait PlaylistStore: Send + Sync {
    /// The owner's default-flagged playlist, if any.
    async fn find_default(&self, owner_id: &str) -> Result<Option<PlaylistRef>, BackendError>;
    async fn insert(&self, playlist: &PlaylistRef) -> Result<(), BackendError>;
    /// Deletes every default-flagged row for the owner.
    async fn delete_default(&self, owner_id: &str) -> Result<(), BackendError>;
}

/// The music service where playlists actually live.
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn create_playlist(
        &self,
        remote_owner_id: &str,
        name: &str,
        description: &str,
        is_public: bool,
    ) -> Result<RemotePlaylist, BackendError>;

    async fn delete_playlist(&self, remote_id: &str) -> Result<(), BackendError>;
}
