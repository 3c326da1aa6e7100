//! HTTP client for CalDAV operations.
//!
//! Wraps the shared [`HttpSession`] with the WebDAV verbs the provider
//! needs: PROPFIND, REPORT, PUT and DELETE.

use reqwest::header::{CONTENT_TYPE, ETAG, HeaderMap, HeaderName, HeaderValue, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Method, StatusCode};
use tracing::trace;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{HttpSession, status_error};

use super::config::CalDavConfig;

const DEPTH: HeaderName = HeaderName::from_static("depth");
const XML: &str = "application/xml; charset=utf-8";
const ICS: &str = "text/calendar; charset=utf-8";

/// Precondition for a PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode<'a> {
    /// Only create; fail if the resource exists.
    Create,
    /// Only overwrite the given version.
    Replace { etag: Option<&'a str> },
}

/// HTTP client for CalDAV operations.
pub struct CalDavClient {
    session: HttpSession,
    config: CalDavConfig,
}

impl CalDavClient {
    /// Creates a new CalDAV client with the given configuration.
    pub fn new(config: CalDavConfig) -> ProviderResult<Self> {
        let session = HttpSession::new(&config.session_options(), config.credentials.clone())?;
        Ok(Self { session, config })
    }

    /// Performs a PROPFIND request.
    pub async fn propfind(&mut self, url: &str, body: &str, depth: u8) -> ProviderResult<String> {
        self.xml_request("PROPFIND", url, body, depth).await
    }

    /// Performs a REPORT request (calendar-query).
    pub async fn report(&mut self, url: &str, body: &str) -> ProviderResult<String> {
        self.xml_request("REPORT", url, body, 1).await
    }

    /// Stores a calendar object and returns the new ETag when the server
    /// sends one.
    pub async fn put(
        &mut self,
        url: &str,
        ics: &str,
        mode: PutMode<'_>,
    ) -> ProviderResult<Option<String>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(ICS));
        match mode {
            PutMode::Create => {
                headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
            }
            PutMode::Replace { etag: Some(etag) } => {
                headers.insert(IF_MATCH, header_value(etag)?);
            }
            PutMode::Replace { etag: None } => {}
        }

        let response = self.session.send(Method::PUT, url, headers, Some(ics)).await?;
        let status = response.status();
        trace!(status = %status, url = %url, "PUT response");
        if !status.is_success() {
            if mode == PutMode::Create && status == StatusCode::PRECONDITION_FAILED {
                return Err(ProviderError::conflict("An event with this id already exists"));
            }
            return Err(status_error(response, "Event").await);
        }

        Ok(response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    /// Deletes a calendar object, optionally guarded by its ETag.
    pub async fn delete(&mut self, url: &str, etag: Option<&str>) -> ProviderResult<()> {
        let mut headers = HeaderMap::new();
        if let Some(etag) = etag {
            headers.insert(IF_MATCH, header_value(etag)?);
        }

        let response = self.session.send(Method::DELETE, url, headers, None).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response, "Event").await)
        }
    }

    async fn xml_request(
        &mut self,
        method: &str,
        url: &str,
        body: &str,
        depth: u8,
    ) -> ProviderResult<String> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ProviderError::internal(format!("Invalid HTTP method: {method}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(XML));
        headers.insert(DEPTH, HeaderValue::from(u16::from(depth)));

        let response = self.session.send(method, url, headers, Some(body)).await?;
        let status = response.status();
        trace!(status = %status, "Received response");

        if status.is_success() {
            response
                .text()
                .await
                .map_err(|e| ProviderError::network(format!("Failed to read response: {e}")))
        } else {
            Err(status_error(response, "Calendar or resource").await)
        }
    }

    /// Returns the base URL from the configuration.
    pub fn base_url(&self) -> &str {
        self.config.url_str()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CalDavConfig {
        &self.config
    }
}

fn header_value(value: &str) -> ProviderResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ProviderError::invalid_response(format!("Invalid ETag '{value}'")).with_source(e))
}
