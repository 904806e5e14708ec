use std::collections::VecDeque;

use recap_core::{MessageId, MessageRecord};

use crate::error::EngineError;

/// Result of [`ConversationBuffer::append`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Appended after dropping the oldest record.
    Evicted(MessageId),
    /// Not stored: the id did not increase past `last`.
    RejectedOutOfOrder { last: MessageId },
}

impl AppendOutcome {
    pub fn stored(&self) -> bool {
        !matches!(self, Self::RejectedOutOfOrder { .. })
    }
}

/// Bounded, oldest-first window of one conversation's messages.
#[derive(Clone, Debug)]
pub struct ConversationBuffer {
    records: VecDeque<MessageRecord>,
    capacity: usize,
}

impl ConversationBuffer {
    pub fn new(capacity: usize) -> Result<Self, EngineError> {
        if capacity == 0 {
            return Err(EngineError::InvalidCapacity(capacity));
        }
        Ok(Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Append a record, evicting the oldest at capacity.
    ///
    /// Ids must strictly increase; anything else is left out and reported.
    pub fn append(&mut self, record: MessageRecord) -> AppendOutcome {
        if let Some(last) = self.last_id() {
            if record.id <= last {
                return AppendOutcome::RejectedOutOfOrder { last };
            }
        }

        let evicted = if self.records.len() == self.capacity {
            self.records.pop_front().map(|r| r.id)
        } else {
            None
        };
        self.records.push_back(record);

        match evicted {
            Some(id) => AppendOutcome::Evicted(id),
            None => AppendOutcome::Appended,
        }
    }

    /// The most recent `min(n, len)` records, oldest first.
    pub fn window(&self, n: usize) -> Result<Vec<MessageRecord>, EngineError> {
        if n == 0 {
            return Err(EngineError::InvalidCount(0));
        }
        let skip = self.records.len().saturating_sub(n);
        Ok(self.records.iter().skip(skip).cloned().collect())
    }

    pub fn all(&self) -> Vec<MessageRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn last_id(&self) -> Option<MessageId> {
        self.records.back().map(|r| r.id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
