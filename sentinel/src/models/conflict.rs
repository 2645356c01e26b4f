use serde::{Deserialize, Serialize};

use super::fact::{FactKey, StoredFact};

/// A pending decision: a newly stored single-valued fact that disagrees
/// with facts already in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub subject: String,
    pub relation: String,
    pub new_object: String,
    pub new_timestamp: String,
    pub old: Vec<StoredFact>,
}

impl ConflictRecord {
    /// Store key of the new fact.
    pub fn new_key(&self) -> FactKey {
        FactKey {
            subject: self.subject.clone(),
            relation: self.relation.clone(),
            object: self.new_object.clone(),
            timestamp: self.new_timestamp.clone(),
        }
    }

    /// Queue key: at most one pending record per (subject, relation).
    pub fn slot(&self) -> (&str, &str) {
        (&self.subject, &self.relation)
    }

    pub fn new_fact_line(&self) -> String {
        format!(
            "[{}] {} -[{}]-> {}",
            self.new_timestamp, self.subject, self.relation, self.new_object
        )
    }
}

/// The three ways a user can settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionChoice {
    /// Prior facts are outdated; the new fact is current.
    A,
    /// Old and new facts are all true at once.
    B,
    /// The new fact is wrong and is deleted.
    C,
}

impl ResolutionChoice {
    pub fn label(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    pub fn all() -> [ResolutionChoice; 3] {
        [Self::A, Self::B, Self::C]
    }

    /// Canonical option text shown to the user.
    pub fn default_text(&self) -> &'static str {
        match self {
            Self::A => "The old fact is outdated; the new fact is now correct.",
            Self::B => "Both facts are true (for example, different time periods or multiple roles).",
            Self::C => "The new fact is incorrect; keep the old one.",
        }
    }
}

impl std::fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
