//! Azure Storage Queue client using the HTTP REST API.
//!
//! Talks to the queue service directly over `reqwest` so responses can be
//! mocked in unit tests.
//!
//! ## Operations
//!
//! | Primitive          | Request                                                   |
//! |--------------------|-----------------------------------------------------------|
//! | `exists`           | `GET /{queue}?comp=metadata`                              |
//! | `create_if_absent` | `PUT /{queue}` (201 created, 204 already present)         |
//! | `clear`            | `DELETE /{queue}/messages`                                |
//! | `add`              | `POST /{queue}/messages`                                  |
//! | `peek`             | `GET /{queue}/messages?peekonly=true`                     |
//! | `get_batch`        | `GET /{queue}/messages?numofmessages=N&visibilitytimeout=S` |
//! | `delete`           | `DELETE /{queue}/messages/{id}?popreceipt=R`              |
//!
//! ## Authentication
//!
//! A shared access signature is appended to every request. Without one,
//! requests are sent anonymously, which suits local emulators.
//!
//! ## Limits
//!
//! - At most 32 messages per `get_batch`
//! - Visibility timeouts are whole seconds between 1 second and 7 days;
//!   leases are rounded up and clamped into that range
//! - Message text is limited to 64 KiB after base64 encoding

use crate::client::{PopReceipt, RawMessage, RawQueueClient};
use crate::error::ProviderError;
use crate::message::{QueueName, Timestamp};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace, warn};

#[cfg(test)]
#[path = "storage_queue_tests.rs"]
mod tests;

/// REST API version sent with every request
pub const API_VERSION: &str = "2021-12-02";

/// Largest batch the service returns from one `get_batch`
pub const MAX_BATCH_SIZE: u32 = 32;

/// Largest message text accepted by the service
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Longest visibility timeout accepted by the service
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ============================================================================
// Configuration
// ============================================================================

/// Storage account connection settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageQueueConfig {
    /// Storage account name, used to derive the default endpoint
    pub account_name: String,

    /// Explicit queue service endpoint, e.g. an emulator URL
    pub endpoint: Option<String>,

    /// Shared access signature, with or without the leading `?`
    pub sas_token: Option<String>,

    /// Per-request timeout
    pub timeout_seconds: u64,
}

impl Default for StorageQueueConfig {
    fn default() -> Self {
        Self {
            account_name: String::new(),
            endpoint: None,
            sas_token: None,
            timeout_seconds: 30,
        }
    }
}

impl StorageQueueConfig {
    /// Queue service base URL without a trailing slash
    pub fn endpoint_url(&self) -> Result<String, ProviderError> {
        match &self.endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => {
                Ok(endpoint.trim().trim_end_matches('/').to_string())
            }
            _ if !self.account_name.is_empty() => Ok(format!(
                "https://{}.queue.core.windows.net",
                self.account_name
            )),
            _ => Err(ProviderError::Configuration {
                message: "either account_name or endpoint must be set".to_string(),
            }),
        }
    }
}

impl fmt::Debug for StorageQueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageQueueConfig")
            .field("account_name", &self.account_name)
            .field("endpoint", &self.endpoint)
            .field("sas_token", &self.sas_token.as_ref().map(|_| "<REDACTED>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

// ============================================================================
// StorageQueueClient
// ============================================================================

/// Raw queue client for Azure Storage Queues
pub struct StorageQueueClient {
    http_client: HttpClient,
    endpoint: String,
    sas_query: Option<String>,
    timeout: Duration,
}

impl StorageQueueClient {
    /// Create new client
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if neither an account name nor
    /// an endpoint is configured, the timeout is zero, or the HTTP client
    /// cannot be built.
    pub fn new(config: StorageQueueConfig) -> Result<Self, ProviderError> {
        let endpoint = config.endpoint_url()?;

        if config.timeout_seconds == 0 {
            return Err(ProviderError::Configuration {
                message: "timeout_seconds must be greater than 0".to_string(),
            });
        }
        let timeout = Duration::from_secs(config.timeout_seconds);

        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let sas_query = config
            .sas_token
            .as_deref()
            .map(|token| token.trim().trim_start_matches('?').to_string())
            .filter(|token| !token.is_empty());

        Ok(Self {
            http_client,
            endpoint,
            sas_query,
            timeout,
        })
    }

    /// Build a request URL for `path`, appending the SAS token last
    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        if let Some(sas) = &self.sas_query {
            query.push(sas.clone());
        }

        if query.is_empty() {
            format!("{}/{}", self.endpoint, path)
        } else {
            format!("{}/{}?{}", self.endpoint, path, query.join("&"))
        }
    }

    /// Send a request; non-success statuses become provider errors
    async fn execute(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<String>,
    ) -> Result<(StatusCode, String), ProviderError> {
        let url = self.url(path, params);
        trace!(method = %method, path, "Sending queue service request");

        let mut request = self
            .http_client
            .request(method, &url)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-date", Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string());

        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/xml")
                .body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    duration: self.timeout,
                }
            } else if e.is_connect() {
                ProviderError::ConnectionFailed {
                    message: format!("Connection failed: {}", e),
                }
            } else {
                ProviderError::ConnectionFailed {
                    message: format!("HTTP request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| ProviderError::ConnectionFailed {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16(), path));
        }

        Ok((status, response_body))
    }
}

impl fmt::Debug for StorageQueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageQueueClient")
            .field("endpoint", &self.endpoint)
            .field("sas_token", &self.sas_query.as_ref().map(|_| "<REDACTED>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl RawQueueClient for StorageQueueClient {
    async fn exists(&self, queue: &QueueName) -> Result<bool, ProviderError> {
        let params = [("comp", "metadata".to_string())];
        match self.execute(Method::GET, queue.as_str(), &params, None).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_if_absent(&self, queue: &QueueName) -> Result<bool, ProviderError> {
        let result = self
            .execute(Method::PUT, queue.as_str(), &[], None)
            .await;

        match result {
            Ok((status, _)) => {
                let created = status == StatusCode::CREATED;
                debug!(queue = %queue, created, "Ensured queue exists");
                Ok(created)
            }
            // Present with different metadata; still usable
            Err(ProviderError::Service { status: 409, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn clear(&self, queue: &QueueName) -> Result<(), ProviderError> {
        let path = format!("{}/messages", queue);
        self.execute(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    async fn add(&self, queue: &QueueName, body: Bytes) -> Result<(), ProviderError> {
        let text = STANDARD.encode(&body);
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ProviderError::MessageTooLarge {
                size: text.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        let payload = format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            text
        );
        let path = format!("{}/messages", queue);
        self.execute(Method::POST, &path, &[], Some(payload)).await?;
        Ok(())
    }

    async fn peek(&self, queue: &QueueName) -> Result<Option<RawMessage>, ProviderError> {
        let path = format!("{}/messages", queue);
        let params = [
            ("peekonly", "true".to_string()),
            ("numofmessages", "1".to_string()),
        ];
        let (_, xml) = self.execute(Method::GET, &path, &params, None).await?;

        Ok(parse_message_list(&xml)?.into_iter().next())
    }

    async fn get_batch(
        &self,
        queue: &QueueName,
        count: u32,
        lease: Duration,
    ) -> Result<Vec<RawMessage>, ProviderError> {
        if lease > MAX_VISIBILITY_TIMEOUT {
            warn!(
                queue = %queue,
                lease_ms = lease.as_millis() as u64,
                "Lease exceeds the service maximum; clamping to 7 days"
            );
        }

        let path = format!("{}/messages", queue);
        let params = [
            ("numofmessages", count.clamp(1, MAX_BATCH_SIZE).to_string()),
            (
                "visibilitytimeout",
                visibility_timeout_seconds(lease).to_string(),
            ),
        ];
        let (_, xml) = self.execute(Method::GET, &path, &params, None).await?;

        parse_message_list(&xml)
    }

    async fn delete(&self, queue: &QueueName, message: &RawMessage) -> Result<(), ProviderError> {
        let receipt = message
            .pop_receipt
            .as_ref()
            .ok_or_else(|| ProviderError::NotFound {
                resource: format!("lease for message '{}'", message.message_id),
            })?;

        let path = format!(
            "{}/messages/{}",
            queue,
            urlencoding::encode(&message.message_id)
        );
        let params = [("popreceipt", receipt.as_str().to_string())];

        match self.execute(Method::DELETE, &path, &params, None).await {
            Ok(_) => Ok(()),
            // The lease was superseded by a later fetch
            Err(ProviderError::Service { code, .. }) if code == "PopReceiptMismatch" => {
                Err(ProviderError::NotFound {
                    resource: format!("lease for message '{}'", message.message_id),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn provider_name(&self) -> &'static str {
        "storage-queue"
    }

    fn max_batch_size(&self) -> u32 {
        MAX_BATCH_SIZE
    }
}

// ============================================================================
// Wire helpers
// ============================================================================

/// Whole seconds for a lease, rounded up and clamped to the service range
pub(crate) fn visibility_timeout_seconds(lease: Duration) -> u64 {
    let mut seconds = lease.as_secs();
    if lease.subsec_nanos() > 0 {
        seconds += 1;
    }
    seconds.clamp(1, MAX_VISIBILITY_TIMEOUT.as_secs())
}

/// Map an error response to a provider error
pub(crate) fn parse_error_response(xml: &str, status: u16, resource: &str) -> ProviderError {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_error = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = true,
                b"Code" if in_error => in_code = true,
                b"Message" if in_error => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Error" => {
                in_error = false;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code.unwrap_or_else(|| "Unknown".to_string());
    let message = error_message.unwrap_or_else(|| format!("HTTP {}", status));

    match status {
        404 => ProviderError::NotFound {
            resource: resource.to_string(),
        },
        401 | 403 => ProviderError::AuthenticationFailed {
            message: format!("{}: {}", code, message),
        },
        413 => ProviderError::MessageTooLarge {
            size: 0,
            max_size: MAX_MESSAGE_SIZE,
        },
        _ => ProviderError::Service {
            status,
            code,
            message,
        },
    }
}

#[derive(Default)]
struct MessageFields {
    message_id: Option<String>,
    pop_receipt: Option<String>,
    text: Option<String>,
    dequeue_count: u32,
    inserted_at: Option<String>,
    next_visible_at: Option<String>,
}

impl MessageFields {
    fn into_raw(self) -> Result<RawMessage, ProviderError> {
        let message_id = self.message_id.ok_or_else(|| ProviderError::InvalidResponse {
            message: "QueueMessage without MessageId".to_string(),
        })?;

        let text = self.text.unwrap_or_default();
        // Messages written by other producers may not be base64 encoded
        let body = match STANDARD.decode(text.as_bytes()) {
            Ok(decoded) => Bytes::from(decoded),
            Err(_) => {
                debug!(message_id = %message_id, "Message text is not base64; passing it through");
                Bytes::from(text)
            }
        };

        Ok(RawMessage {
            message_id,
            pop_receipt: self.pop_receipt.map(PopReceipt::new),
            body,
            dequeue_count: self.dequeue_count,
            inserted_at: self
                .inserted_at
                .as_deref()
                .and_then(parse_http_date)
                .unwrap_or_else(Timestamp::now),
            next_visible_at: self.next_visible_at.as_deref().and_then(parse_http_date),
        })
    }
}

/// Parse a `QueueMessagesList` response
pub(crate) fn parse_message_list(xml: &str) -> Result<Vec<RawMessage>, ProviderError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut messages = Vec::new();
    let mut current: Option<MessageFields> = None;
    let mut field: Option<Vec<u8>> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"QueueMessage" {
                    current = Some(MessageFields::default());
                } else if current.is_some() {
                    field = Some(e.name().as_ref().to_vec());
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(fields), Some(name)) = (current.as_mut(), field.as_deref()) {
                    let text = e
                        .unescape()
                        .map_err(|e| ProviderError::InvalidResponse {
                            message: format!("Failed to parse XML: {}", e),
                        })?
                        .into_owned();
                    match name {
                        b"MessageId" => fields.message_id = Some(text),
                        b"PopReceipt" => fields.pop_receipt = Some(text),
                        b"MessageText" => fields.text = Some(text),
                        b"DequeueCount" => fields.dequeue_count = text.parse().unwrap_or(0),
                        b"InsertionTime" => fields.inserted_at = Some(text),
                        b"TimeNextVisible" => fields.next_visible_at = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"QueueMessage" {
                    if let Some(fields) = current.take() {
                        messages.push(fields.into_raw()?);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProviderError::InvalidResponse {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Parse an RFC 1123 date such as `Fri, 09 Oct 2009 21:04:30 GMT`
fn parse_http_date(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
}
