use serde::{Deserialize, Serialize};

/// A literal candidate fact emitted by the Curator, before canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFact {
    #[serde(rename = "subj")]
    pub subject: String,
    #[serde(rename = "rel")]
    pub relation: String,
    #[serde(rename = "obj")]
    pub object: String,
    pub confidence: f32,
}

/// A relation produced by the Structurer. Endpoints may be `USER`, a
/// synthetic entity key, or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRelation {
    #[serde(rename = "subj")]
    pub subject: String,
    #[serde(rename = "rel")]
    pub relation: String,
    #[serde(rename = "obj")]
    pub object: String,
    pub confidence: f32,
    pub derived: bool,
}

impl StructuredRelation {
    pub fn new(subject: &str, relation: &str, object: &str) -> Self {
        Self {
            subject: subject.to_string(),
            relation: relation.to_string(),
            object: object.to_string(),
            confidence: 0.8,
            derived: true,
        }
    }
}

impl From<&CandidateFact> for StructuredRelation {
    fn from(candidate: &CandidateFact) -> Self {
        Self {
            subject: candidate.subject.clone(),
            relation: candidate.relation.clone(),
            object: candidate.object.clone(),
            confidence: candidate.confidence,
            derived: false,
        }
    }
}

/// A reified entity (event, task, program...) introduced by the Structurer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticEntity {
    pub key: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_text: Option<String>,
}
