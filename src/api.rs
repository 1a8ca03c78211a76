//! HTTP API for the conversation thread

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::builder::MessageBuilder;
use crate::exchange::Exchange;
use crate::poller::ModificationBaseline;
use crate::snapshot::SnapshotStore;
use crate::tokenizer::TokenizerConfig;
use crate::upstream::ReplySource;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<Exchange>,
    pub builder: MessageBuilder,
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Acknowledges our own saves to the change poller
    pub baseline: ModificationBaseline,
    pub upstream: Option<Arc<dyn ReplySource>>,
    pub tokenizer: TokenizerConfig,
}

impl AppState {
    pub fn new(
        exchange: Arc<Exchange>,
        snapshots: Arc<dyn SnapshotStore>,
        baseline: ModificationBaseline,
        upstream: Option<Arc<dyn ReplySource>>,
        tokenizer: TokenizerConfig,
    ) -> Self {
        Self {
            builder: MessageBuilder::new(Arc::clone(&exchange)),
            exchange,
            snapshots,
            baseline,
            upstream,
            tokenizer,
        }
    }
}
