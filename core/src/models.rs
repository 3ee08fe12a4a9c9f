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

use serde::{Deserialize, Serialize};
use std::fmt;

/// An access/refresh token pair. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// An authenticated session as handed out by the auth provider.
///
/// Only the user id and the optional provider (Spotify) token pair are read
/// by this crate; the rest is carried so callers can talk to the backend
/// on the user's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub provider_token: Option<String>,
    pub provider_refresh_token: Option<String>,
}

impl Session {
    /// The provider token pair, if the session carries a provider access token.
    pub fn provider_tokens(&self) -> Option<TokenPair> {
        self.provider_token.as_ref().map(|access| TokenPair {
            access_token: Some(access.clone()),
            refresh_token: self.provider_refresh_token.clone(),
        })
    }
}

/// The signed-in user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// UI-facing authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Idle,
    Loading,
    Success { user_id: String },
    Error { message: String },
}

impl AuthState {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error { .. })
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Loading => write!(f, "Loading"),
            Self::Success { user_id } if user_id.is_empty() => {
                write!(f, "Signed in (no user id reported)")
            }
            Self::Success { user_id } => write!(f, "Signed in as {}", user_id),
            Self::Error { message } => write!(f, "Error: {}", message),
        }
    }
}

/// A playlist created in the content backend (Spotify).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
    pub external_url: Option<String>,
}

/// A persisted reference to a remote playlist, owned by a backend user.
///
/// At most one row per owner is expected to carry `is_default = true`;
/// nothing below the reconciler enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    #[serde(rename = "spotify_playlist_id")]
    pub remote_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(default)]
    pub is_default: bool,
}

impl PlaylistRef {
    /// Builds the default-flagged reference for a freshly created remote playlist.
    pub fn default_for(owner_id: &str, remote: &RemotePlaylist) -> Self {
        Self {
            remote_id: remote.id.clone(),
            display_name: remote.name.clone(),
            external_url: remote.external_url.clone(),
            owner_id: owner_id.to_string(),
            is_default: true,
        }
    }
}

impl fmt::Display for PlaylistRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.remote_id, self.display_name)?;
        if let Some(url) = &self.external_url {
            write!(f, " ({})", url)?;
        }
        Ok(())
    }
}
