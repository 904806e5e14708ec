pub mod completion;
pub mod errors;
pub mod ids;
pub mod message;
pub mod tags;
pub mod tone;

pub use completion::{Completion, CompletionRequest, CompletionService, StopReason};
pub use errors::CompletionError;
pub use ids::{ConversationId, MessageId, RequestId};
pub use message::MessageRecord;
pub use tags::ContentTag;
pub use tone::Tone;
