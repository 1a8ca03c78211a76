//! Word tokenizer over an async byte stream
//!
//! Splits incoming UTF-8 text into delimiter-terminated tokens. The
//! delimiter stays attached to the end of its token so concatenating the
//! tokens gives back the original text.

use futures::stream::{self, Stream};
use std::collections::HashSet;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// Delimiters used when none are configured
pub const DEFAULT_DELIMITERS: &[char] = &[' ', '.', ',', '?', '!', '-', '_', '(', ')'];

/// What to do with text left in the buffer when the stream ends mid-word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingPartial {
    /// Return the leftover text as a final token with no delimiter
    #[default]
    Emit,
    /// Discard the leftover text
    Drop,
}

/// Tokenizer configuration
#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    pub delimiters: HashSet<char>,
    pub trailing: TrailingPartial,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            delimiters: DEFAULT_DELIMITERS.iter().copied().collect(),
            trailing: TrailingPartial::default(),
        }
    }
}

impl TokenizerConfig {
    /// Build a config from a string listing every delimiter character
    pub fn with_delimiters(delimiters: &str) -> Self {
        Self {
            delimiters: delimiters.chars().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn trailing(mut self, trailing: TrailingPartial) -> Self {
        self.trailing = trailing;
        self
    }
}

/// Lazily yields tokens from `R`, one character read at a time
pub struct Tokenizer<R> {
    reader: BufReader<R>,
    config: TokenizerConfig,
    /// Bytes of a UTF-8 sequence that is not complete yet
    pending: Vec<u8>,
    /// Byte read past a malformed sequence, decoded on the next call
    carry: Option<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> Tokenizer<R> {
    pub fn new(reader: R, config: TokenizerConfig) -> Self {
        Self {
            reader: BufReader::new(reader),
            config,
            pending: Vec::with_capacity(4),
            carry: None,
            finished: false,
        }
    }

    /// Read until the next delimiter.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. Read errors are
    /// returned as-is; the tokenizer does not retry.
    pub async fn next_token(&mut self) -> io::Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }

        let mut buffer = String::new();
        loop {
            let Some(ch) = self.next_char().await? else {
                self.finished = true;
                return Ok(match self.config.trailing {
                    TrailingPartial::Emit if !buffer.is_empty() => Some(buffer),
                    TrailingPartial::Emit => None,
                    TrailingPartial::Drop => {
                        if !buffer.is_empty() {
                            tracing::debug!(dropped = %buffer, "Dropping trailing partial token");
                        }
                        None
                    }
                });
            };

            buffer.push(ch);
            if self.config.delimiters.contains(&ch) {
                return Ok(Some(buffer));
            }
        }
    }

    /// Turn the tokenizer into a stream of tokens
    pub fn into_stream(self) -> impl Stream<Item = io::Result<String>> {
        stream::try_unfold(self, |mut tokenizer| async move {
            let token = tokenizer.next_token().await?;
            Ok(token.map(|t| (t, tokenizer)))
        })
    }

    /// Decode the next character, replacing malformed sequences with U+FFFD
    async fn next_char(&mut self) -> io::Result<Option<char>> {
        loop {
            let next = match self.carry.take() {
                Some(b) => Ok(b),
                None => self.reader.read_u8().await,
            };
            let byte = match next {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    // Truncated sequence at end of stream
                    self.pending.clear();
                    return Ok(Some(char::REPLACEMENT_CHARACTER));
                }
                Err(e) => return Err(e),
            };

            if self.pending.is_empty() {
                match utf8_width(byte) {
                    Some(1) => return Ok(Some(char::from(byte))),
                    Some(_) => self.pending.push(byte),
                    None => return Ok(Some(char::REPLACEMENT_CHARACTER)),
                }
                continue;
            }

            if byte & 0xC0 != 0x80 {
                // Continuation expected but a new sequence started
                self.pending.clear();
                self.carry = Some(byte);
                return Ok(Some(char::REPLACEMENT_CHARACTER));
            }

            self.pending.push(byte);
            let width = utf8_width(self.pending[0]).unwrap_or(1);
            if self.pending.len() == width {
                let decoded = std::str::from_utf8(&self.pending)
                    .ok()
                    .and_then(|s| s.chars().next())
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                self.pending.clear();
                return Ok(Some(decoded));
            }
        }
    }
}

/// Encoded length implied by a UTF-8 lead byte
fn utf8_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}
