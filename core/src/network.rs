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

use log::{debug, error};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Too many requests: {0}")]
    TooManyRequests(String),
    #[error("Server error ({code}): {message}")]
    Server { code: u16, message: String },
    #[error("HTTP {code}: {message}")]
    Http { code: u16, message: String },
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl NetworkError {
    /// The HTTP status behind this error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::TooManyRequests(_) => Some(429),
            Self::Server { code, .. } | Self::Http { code, .. } => Some(*code),
            Self::Connection(_) | Self::Decode(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Connection(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::TooManyRequests(m)
            | Self::Decode(m) => m,
            Self::Server { message, .. } | Self::Http { message, .. } => message,
        }
    }
}

// Spotify: {"error": {"status": 404, "message": "..."}}
#[derive(Deserialize)]
struct NestedEnvelope {
    error: NestedError,
}

#[derive(Deserialize)]
struct NestedError {
    message: String,
}

// PostgREST / GoTrue: {"message": "...", "code": "..."}
#[derive(Deserialize)]
struct FlatEnvelope {
    #[serde(alias = "msg")]
    message: String,
}

/// Picks the most useful message out of an error response body.
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<NestedEnvelope>(body) {
        if !envelope.error.message.is_empty() {
            return envelope.error.message;
        }
    }
    if let Ok(envelope) = serde_json::from_str::<FlatEnvelope>(body) {
        if !envelope.message.is_empty() {
            return envelope.message;
        }
    }

    let raw = body.trim();
    if raw.is_empty() {
        format!("HTTP {}", status)
    } else {
        raw.to_string()
    }
}

/// Maps a non-success status and its body to a typed error, logging it.
pub fn classify(status: u16, url: &str, body: &str) -> NetworkError {
    let message = error_message(status, body);
    error!("HTTP {} from {}: {}", status, url, message);

    match status {
        401 => NetworkError::Unauthorized(message),
        403 => NetworkError::Forbidden(message),
        404 => NetworkError::NotFound(message),
        429 => NetworkError::TooManyRequests(message),
        500..=599 => NetworkError::Server {
            code: status,
            message,
        },
        code => NetworkError::Http { code, message },
    }
}

/// Passes success responses through; reads the body once and classifies the rest.
pub async fn check_response(response: Response) -> Result<Response, NetworkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(classify(status.as_u16(), &url, &body))
}

pub fn transport_error(err: &reqwest::Error) -> NetworkError {
    let url = err
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    error!("Transport failure for {}: {}", url, err);
    if err.is_timeout() {
        NetworkError::Connection(format!("Request timed out: {}", err))
    } else {
        NetworkError::Connection(err.to_string())
    }
}

/// Thin wrapper over `reqwest::Client` that routes every response through [`classify`].
#[derive(Debug, Clone, Default)]
pub struct ApiClient {
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Sends the request. No retries: that is left to callers.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, NetworkError> {
        let response = request.send().await.map_err(|e| transport_error(&e))?;
        debug!("{} {}", response.status(), response.url());
        check_response(response).await
    }

    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, NetworkError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| NetworkError::Decode(e.to_string()))
    }
}
