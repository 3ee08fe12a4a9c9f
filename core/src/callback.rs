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

use crate::models::TokenPair;
use crate::session::AuthError;
use std::collections::HashMap;

/// Key/value pairs found in a callback URL fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    params: HashMap<String, String>,
}

impl CallbackParams {
    /// Parses the fragment (everything after the first `#`).
    ///
    /// Pairs are split on `&`, then on the first `=`. Later duplicates win.
    /// Segments without `=` are ignored. Never fails.
    pub fn parse(url: &str) -> Self {
        let fragment = url.split_once('#').map(|(_, f)| f).unwrap_or_default();

        let params = fragment
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The auth session pair, present only if both keys are.
    pub fn token_pair(&self) -> Option<TokenPair> {
        let access = self.get("access_token")?;
        let refresh = self.get("refresh_token")?;
        Some(TokenPair::new(access, refresh))
    }

    /// The content-provider pair some auth providers append to the fragment.
    pub fn provider_tokens(&self) -> Option<TokenPair> {
        self.get("provider_token").map(|access| TokenPair {
            access_token: Some(access.to_string()),
            refresh_token: self.get("provider_refresh_token").map(str::to_string),
        })
    }

    /// Provider-side error text (`error_description`, else `error`).
    pub fn error_message(&self) -> Option<String> {
        self.get("error_description")
            .or_else(|| self.get("error"))
            .map(|msg| msg.replace('+', " "))
    }
}

/// Extracts the auth token pair from a deep-link callback URL.
pub fn parse_callback(url: &str) -> Result<TokenPair, AuthError> {
    CallbackParams::parse(url)
        .token_pair()
        .ok_or(AuthError::MissingTokens)
}
