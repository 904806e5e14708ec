//! # recap-engine
//!
//! The summarization pipeline: per-conversation buffers, content
//! classification, processor fan-out, tone generation and backlinking.

pub mod buffer;
pub mod classify;
pub mod error;
pub mod linking;
pub mod orchestrator;
pub mod processors;
pub mod service;
pub mod store;
pub mod tone;
pub mod transcript;

pub use buffer::{AppendOutcome, ConversationBuffer};
pub use classify::{classify, ClassificationResult, TagHits};
pub use error::{EngineError, ProcessorError};
pub use linking::{attach_links, find_candidates, permalink, LinkCandidate};
pub use orchestrator::{CompositionContext, Orchestrator, PipelineOutcome, ProcessorOutput, Stage};
pub use processors::{default_registry, Processor, ProcessorBatch, ProcessorRegistry};
pub use service::{SummaryOutcome, SummaryService, SummaryStatus, NOTHING_TO_SUMMARIZE};
pub use store::ConversationStore;
