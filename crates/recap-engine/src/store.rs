use dashmap::DashMap;
use tracing::{debug, warn};

use recap_core::{ConversationId, MessageRecord, Tone};

use crate::buffer::{AppendOutcome, ConversationBuffer};
use crate::error::EngineError;

struct ConversationState {
    buffer: ConversationBuffer,
    tone: Option<Tone>,
}

/// Per-conversation buffers and tone selections, keyed by conversation id.
///
/// Each conversation is guarded independently. Readers get copies, so a
/// summarization in flight never observes a concurrent append.
pub struct ConversationStore {
    conversations: DashMap<ConversationId, ConversationState>,
    capacity: usize,
}

impl ConversationStore {
    pub fn new(capacity: usize) -> Result<Self, EngineError> {
        // Fail here rather than on the first message.
        ConversationBuffer::new(capacity)?;
        Ok(Self {
            conversations: DashMap::new(),
            capacity,
        })
    }

    fn state(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, ConversationId, ConversationState>, EngineError> {
        if let Some(state) = self.conversations.get_mut(conversation_id) {
            return Ok(state);
        }
        let buffer = ConversationBuffer::new(self.capacity)?;
        debug!(conversation_id = %conversation_id, capacity = self.capacity, "creating conversation buffer");
        Ok(self
            .conversations
            .entry(conversation_id.clone())
            .or_insert(ConversationState { buffer, tone: None }))
    }

    pub fn append(
        &self,
        conversation_id: &ConversationId,
        record: MessageRecord,
    ) -> Result<AppendOutcome, EngineError> {
        let message_id = record.id;
        let outcome = self.state(conversation_id)?.buffer.append(record);
        if let AppendOutcome::RejectedOutOfOrder { last } = &outcome {
            warn!(
                conversation_id = %conversation_id,
                message_id = message_id.get(),
                last_id = last.get(),
                "dropping out-of-order message"
            );
        }
        Ok(outcome)
    }

    pub fn set_tone(&self, conversation_id: &ConversationId, tone: Tone) -> Result<(), EngineError> {
        self.state(conversation_id)?.tone = Some(tone);
        Ok(())
    }

    pub fn tone(&self, conversation_id: &ConversationId) -> Option<Tone> {
        self.conversations.get(conversation_id).and_then(|s| s.tone)
    }

    /// Point-in-time copy of the most recent `n` records. Unknown conversations are empty.
    pub fn window(
        &self,
        conversation_id: &ConversationId,
        n: usize,
    ) -> Result<Vec<MessageRecord>, EngineError> {
        match self.conversations.get(conversation_id) {
            Some(state) => state.buffer.window(n),
            None if n == 0 => Err(EngineError::InvalidCount(0)),
            None => Ok(Vec::new()),
        }
    }

    pub fn len(&self, conversation_id: &ConversationId) -> usize {
        self.conversations
            .get(conversation_id)
            .map(|s| s.buffer.len())
            .unwrap_or(0)
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}
