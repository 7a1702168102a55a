// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared request handling for Cloudflare API calls.
//!
//! Every call goes through [`ApiClient::request`], which applies authentication,
//! enforces the configured timeout and classifies failures into
//! [`ControlPlaneError`]. There is no retry here; a failed call is reported once.

use super::types::{join_messages, ApiEnvelope, ApiMessage};
use crate::constants::{AUTH_ERROR_CODE, CONNECT_TIMEOUT_SECS};
use crate::errors::ControlPlaneError;
use crate::http_errors::{map_connection_error, map_http_error};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};
use url::Url;

/// Authenticated HTTP client bound to one API base URL.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: HttpClient,
    base_url: Url,
    token: Arc<String>,
    timeout_secs: u64,
}

impl ApiClient {
    /// Build a client with a bounded per-request timeout.
    pub(crate) fn new(
        base_url: Url,
        token: String,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS.min(timeout_secs)))
            .user_agent(concat!("tunnelsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: Arc::new(token),
            timeout_secs,
        })
    }

    /// Build the URL for `segments` below the base URL.
    ///
    /// Segments are percent-encoded individually, so identifiers can never
    /// escape their path position.
    pub(crate) fn url(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url, ControlPlaneError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ControlPlaneError::Transport {
                operation: "build request url".to_string(),
                reason: format!("base url {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Execute a request and return the envelope `result`.
    ///
    /// # Errors
    ///
    /// Returns a [`ControlPlaneError`] on transport failure, non-success HTTP
    /// status, `success: false`, or a response without a decodable result.
    pub(crate) async fn request<B, T>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, ControlPlaneError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (status, result) = self.send::<B, T>(operation, method, url, body).await?;
        result.ok_or_else(|| ControlPlaneError::Rejected {
            operation: operation.to_string(),
            status_code: status.as_u16(),
            reason: "response carried no result".to_string(),
        })
    }

    /// Execute a request whose result is not needed.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::request`], except a missing result is accepted.
    pub(crate) async fn request_ack<B>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(), ControlPlaneError>
    where
        B: Serialize + ?Sized,
    {
        self.send::<B, IgnoredAny>(operation, method, url, body)
            .await
            .map(|_| ())
    }

    async fn send<B, T>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(StatusCode, Option<T>), ControlPlaneError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let start_time = Instant::now();
        debug!(
            operation = %operation,
            method = %method,
            url = %url,
            "Control plane request"
        );

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(self.token.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_connection_error(operation, &e, self.timeout_secs))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_connection_error(operation, &e, self.timeout_secs))?;

        debug!(
            operation = %operation,
            method = %method,
            url = %url,
            status = %status,
            elapsed = ?start_time.elapsed(),
            "Control plane response"
        );

        if !status.is_success() {
            let errors = serde_json::from_slice::<ApiEnvelope<IgnoredAny>>(&bytes)
                .map(|envelope| envelope.errors)
                .unwrap_or_default();
            let err = classify_envelope_errors(operation, status, &errors).unwrap_or_else(|| {
                map_http_error(operation, status.as_u16(), join_messages(&errors))
            });
            error!(
                operation = %operation,
                status = %status,
                error = %err,
                "Control plane call failed"
            );
            return Err(err);
        }

        let envelope: ApiEnvelope<T> =
            serde_json::from_slice(&bytes).map_err(|e| ControlPlaneError::Rejected {
                operation: operation.to_string(),
                status_code: status.as_u16(),
                reason: format!("malformed response: {e}"),
            })?;

        if !envelope.success {
            let err = classify_envelope_errors(operation, status, &envelope.errors).unwrap_or_else(
                || ControlPlaneError::Rejected {
                    operation: operation.to_string(),
                    status_code: status.as_u16(),
                    reason: if envelope.errors.is_empty() {
                        "success flag false without errors".to_string()
                    } else {
                        join_messages(&envelope.errors)
                    },
                },
            );
            error!(
                operation = %operation,
                status = %status,
                error = %err,
                "Control plane reported failure"
            );
            return Err(err);
        }

        Ok((status, envelope.result))
    }
}

/// Envelope-level authentication errors override the HTTP status mapping.
fn classify_envelope_errors(
    operation: &str,
    status: StatusCode,
    errors: &[ApiMessage],
) -> Option<ControlPlaneError> {
    errors
        .iter()
        .any(|m| m.code == AUTH_ERROR_CODE)
        .then(|| ControlPlaneError::Auth {
            operation: operation.to_string(),
            status_code: status.as_u16(),
            reason: join_messages(errors),
        })
}
