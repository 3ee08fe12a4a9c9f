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

use crate::reconciler::PersistFailurePolicy;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_REDIRECT_URI: &str = "swipetune://login-callback";
pub const DEFAULT_TOKEN_STORE: &str = ".swipetune_tokens.json";

/// Spotify scopes requested at login.
/// - user-read-email / user-read-private: profile for the user row.
/// - playlist-modify-private / playlist-modify-public: create the default playlist.
/// - user-library-modify: save swiped-right songs to Liked Songs.
pub const SPOTIFY_SCOPES: &[&str] = &[
    "user-read-email",
    "user-read-private",
    "playlist-modify-private",
    "playlist-modify-public",
    "user-library-modify",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: Url,
    pub supabase_anon_key: String,
    pub redirect_uri: String,
    pub token_store_path: PathBuf,
    pub persist_failure_policy: PersistFailurePolicy,
    pub poll: PollConfig,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// - `SWIPETUNE_SUPABASE_URL` (required)
    /// - `SWIPETUNE_SUPABASE_ANON_KEY` (required)
    /// - `SWIPETUNE_REDIRECT_URI`
    /// - `SWIPETUNE_TOKEN_STORE`
    /// - `SWIPETUNE_ROLLBACK_ON_PERSIST_FAILURE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = lookup("SWIPETUNE_SUPABASE_URL")
            .ok_or(ConfigError::Missing("SWIPETUNE_SUPABASE_URL"))?;
        let supabase_url = Url::parse(&raw_url).map_err(|e| ConfigError::Invalid {
            name: "SWIPETUNE_SUPABASE_URL",
            reason: e.to_string(),
        })?;

        let supabase_anon_key = lookup("SWIPETUNE_SUPABASE_ANON_KEY")
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::Missing("SWIPETUNE_SUPABASE_ANON_KEY"))?;

        let rollback = match lookup("SWIPETUNE_ROLLBACK_ON_PERSIST_FAILURE").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SWIPETUNE_ROLLBACK_ON_PERSIST_FAILURE",
                    reason: format!("expected true/false, got '{}'", other),
                })
            }
        };

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            redirect_uri: lookup("SWIPETUNE_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            token_store_path: lookup("SWIPETUNE_TOKEN_STORE")
                .unwrap_or_else(|| DEFAULT_TOKEN_STORE.to_string())
                .into(),
            persist_failure_policy: if rollback {
                PersistFailurePolicy::RollbackRemote
            } else {
                PersistFailurePolicy::KeepRemote
            },
            poll: PollConfig::default(),
        })
    }
}
