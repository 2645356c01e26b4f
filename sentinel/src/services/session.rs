use std::collections::VecDeque;

use crate::config::DisplayConfig;
use crate::intelligence::ConflictExplanation;
use crate::models::ConflictRecord;

/// A raised conflict waiting for the user's A/B/C answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConflict {
    pub record: ConflictRecord,
    pub explanation: ConflictExplanation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Per-session state threaded through every turn. Nothing here is persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pending: VecDeque<PendingConflict>,
    history: VecDeque<ChatTurn>,
    history_limit: usize,
    pub show_curator: bool,
    pub show_enricher: bool,
}

impl Session {
    pub fn new(display: &DisplayConfig, history_turns: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            history: VecDeque::new(),
            history_limit: history_turns,
            show_curator: display.show_curator,
            show_enricher: display.show_enricher,
        }
    }

    /// Queue a conflict. A pending record for the same (subject, relation)
    /// is replaced in place, since the newer record already lists every
    /// stored fact the older one did.
    pub fn push_conflict(&mut self, conflict: PendingConflict) {
        let slot = conflict.record.slot();
        if let Some(existing) = self
            .pending
            .iter_mut()
            .find(|pending| pending.record.slot() == slot)
        {
            tracing::debug!(
                subject = %conflict.record.subject,
                relation = %conflict.record.relation,
                "Replacing pending conflict for the same relation"
            );
            *existing = conflict;
            return;
        }
        self.pending.push_back(conflict);
    }

    /// The conflict the next A/B/C answer applies to.
    pub fn current_conflict(&self) -> Option<&PendingConflict> {
        self.pending.front()
    }

    pub fn pop_conflict(&mut self) -> Option<PendingConflict> {
        self.pending.pop_front()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &PendingConflict> {
        self.pending.iter()
    }

    /// Drop every pending conflict not accepted by `keep`, returning how many
    /// were dropped.
    pub fn retain_conflicts(&mut self, keep: impl FnMut(&PendingConflict) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(keep);
        before - self.pending.len()
    }

    pub fn clear_conflicts(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn pending_conflicts(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending_conflict(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn record_exchange(&mut self, user: &str, assistant: &str) {
        if self.history_limit == 0 {
            return;
        }
        for (role, content) in [(ChatRole::User, user), (ChatRole::Assistant, assistant)] {
            self.history.push_back(ChatTurn {
                role,
                content: content.to_string(),
            });
        }
        while self.history.len() > self.history_limit * 2 {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &ChatTurn> {
        self.history.iter()
    }
}
