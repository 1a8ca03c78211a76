//! Client for the upstream service that generates replies
//!
//! The full prior message list is posted as JSON and the response body is
//! consumed as newline-delimited text, one line at a time.

use crate::thread::{Message, MessageRecord};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::bytes::Buf;
use tokio_util::io::StreamReader;

/// Upstream failure with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Network, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => UpstreamErrorKind::Auth,
            429 => UpstreamErrorKind::RateLimit,
            500..=599 => UpstreamErrorKind::ServerError,
            400..=499 => UpstreamErrorKind::InvalidRequest,
            _ => UpstreamErrorKind::Unknown,
        };
        Self::new(kind, format!("upstream returned {status}: {body}"))
    }
}

impl From<io::Error> for UpstreamError {
    fn from(e: io::Error) -> Self {
        Self::network(e.to_string())
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Connection problems, timeouts, broken bodies
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (other 4xx)
    InvalidRequest,
    Unknown,
}

impl UpstreamErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

pub type LineStream = BoxStream<'static, Result<String, UpstreamError>>;

/// Source of streamed replies
#[async_trait]
pub trait ReplySource: Send + Sync {
    /// Start a reply for `history`; the stream yields non-blank lines
    async fn stream_reply(&self, history: &[Message]) -> Result<LineStream, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct ReplyRequest<'a> {
    messages: &'a [MessageRecord],
}

/// [`ReplySource`] backed by an HTTP endpoint
pub struct HttpReplySource {
    client: reqwest::Client,
    url: String,
}

impl HttpReplySource {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReplySource for HttpReplySource {
    async fn stream_reply(&self, history: &[Message]) -> Result<LineStream, UpstreamError> {
        let records: Vec<MessageRecord> = history.iter().map(MessageRecord::from).collect();

        let response = self
            .client
            .post(&self.url)
            .json(&ReplyRequest {
                messages: &records,
            })
            .send()
            .await
            .map_err(|e| UpstreamError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = UpstreamError::from_status(status.as_u16(), &body);
            tracing::error!(url = %self.url, status = status.as_u16(), retryable = err.kind.is_retryable(), "Upstream request failed");
            return Err(err);
        }

        tracing::debug!(url = %self.url, messages = records.len(), "Upstream reply started");
        let chunks = response
            .bytes_stream()
            .map_err(io::Error::other);
        Ok(non_blank_lines(chunks).boxed())
    }
}

/// Split a chunked byte stream into its non-blank lines
pub fn non_blank_lines<S, B>(chunks: S) -> impl Stream<Item = Result<String, UpstreamError>>
where
    S: Stream<Item = io::Result<B>>,
    B: Buf,
{
    let reader = StreamReader::new(chunks);
    LinesStream::new(reader.lines())
        .map_err(UpstreamError::from)
        .try_filter(|line| futures::future::ready(!line.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            UpstreamError::from_status(401, "").kind,
            UpstreamErrorKind::Auth
        );
        assert_eq!(
            UpstreamError::from_status(429, "").kind,
            UpstreamErrorKind::RateLimit
        );
        assert_eq!(
            UpstreamError::from_status(503, "").kind,
            UpstreamErrorKind::ServerError
        );
        assert_eq!(
            UpstreamError::from_status(422, "").kind,
            UpstreamErrorKind::InvalidRequest
        );
        assert!(UpstreamErrorKind::ServerError.is_retryable());
        assert!(!UpstreamErrorKind::Auth.is_retryable());
    }

    #[tokio::test]
    async fn lines_are_reassembled_across_chunks() {
        let chunks: Vec<io::Result<&'static [u8]>> = vec![
            Ok(&b"first li"[..]),
            Ok(&b"ne\n\n  \nsec"[..]),
            Ok(&b"ond\nthird"[..]),
        ];
        let lines: Vec<String> = non_blank_lines(futures::stream::iter(chunks))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(lines, vec!["first line", "second", "third"]);
    }

    #[tokio::test]
    async fn body_errors_surface_as_network_errors() {
        let chunks: Vec<io::Result<&'static [u8]>> = vec![
            Ok(&b"ok\n"[..]),
            Err(io::Error::new(io::ErrorKind::ConnectionAborted, "gone")),
        ];
        let mut lines = Box::pin(non_blank_lines(futures::stream::iter(chunks)));
        assert_eq!(lines.next().await.unwrap().unwrap(), "ok");
        let err = lines.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::Network);
    }
}
