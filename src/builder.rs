//! Incremental message builder
//!
//! Feeds tokens from a transport into the exchange one at a time while the
//! growing message stays visible to readers of the thread store.

use crate::exchange::{Exchange, ExchangeError, ExchangePhase};
use crate::thread::{Message, Role};
use crate::tokenizer::{Tokenizer, TokenizerConfig};
use futures::{Stream, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Outcome of a completed streaming session
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub tokens: usize,
    pub phase: ExchangePhase,
}

/// Builds one message at a time on top of an [`Exchange`]
#[derive(Clone)]
pub struct MessageBuilder {
    exchange: Arc<Exchange>,
}

impl MessageBuilder {
    pub fn new(exchange: Arc<Exchange>) -> Self {
        Self { exchange }
    }

    /// Open a new streaming message for `role`
    pub fn begin(&self, role: Role) -> Result<(), ExchangeError> {
        self.exchange.begin(role)?;
        tracing::debug!(role = %role, "Streaming message opened");
        Ok(())
    }

    pub fn append_token(&self, token: &str) -> Result<(), ExchangeError> {
        self.exchange.append_token(token)?;
        Ok(())
    }

    /// Close the in-progress message; a second call does nothing
    pub fn finish(&self) -> Result<ExchangePhase, ExchangeError> {
        self.exchange.finish()
    }

    /// Replace the last message wholesale, bypassing tokenization
    pub fn replace(&self, message: Message) -> Result<ExchangePhase, ExchangeError> {
        self.exchange.replace_last(message)
    }

    /// Live text of the message being streamed, if any
    pub fn current_text(&self) -> Option<String> {
        self.exchange.store().read(|thread| {
            thread
                .last()
                .filter(|m| m.is_streaming)
                .map(|m| m.content.clone())
        })
    }

    /// Tokenize `reader` into a new message for `role`.
    ///
    /// End of stream finishes the message. A read error is returned and the
    /// message is left streaming so the caller can decide to finish or
    /// discard it.
    pub async fn ingest<R>(
        &self,
        role: Role,
        reader: R,
        config: TokenizerConfig,
    ) -> Result<StreamSummary, ExchangeError>
    where
        R: AsyncRead + Unpin,
    {
        self.begin(role)?;

        let mut stream = pin!(Tokenizer::new(reader, config).into_stream());
        let mut tokens = 0;
        while let Some(token) = stream.next().await {
            let token = token.map_err(|e| {
                tracing::warn!(
                    role = %role,
                    tokens,
                    error = %e,
                    "Stream failed, message left streaming"
                );
                ExchangeError::Transport(e)
            })?;
            self.append_token(&token)?;
            tokens += 1;
        }

        let phase = self.finish()?;
        tracing::info!(role = %role, tokens, phase = phase.name(), "Stream ingested");
        Ok(StreamSummary { tokens, phase })
    }

    /// Relay upstream lines into a new message for `role`.
    ///
    /// Lines after the first are separated by a newline so the message keeps
    /// the upstream line structure. Blank lines are skipped.
    pub async fn relay<S, E>(&self, role: Role, lines: S) -> Result<StreamSummary, ExchangeError>
    where
        S: Stream<Item = Result<String, E>> + Unpin,
        ExchangeError: From<E>,
    {
        self.begin(role)?;

        let mut lines = lines;
        let mut tokens = 0;
        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if tokens == 0 {
                self.append_token(&line)?;
            } else {
                self.append_token(&format!("\n{line}"))?;
            }
            tokens += 1;
        }

        let phase = self.finish()?;
        tracing::info!(role = %role, lines = tokens, phase = phase.name(), "Upstream reply relayed");
        Ok(StreamSummary { tokens, phase })
    }
}
