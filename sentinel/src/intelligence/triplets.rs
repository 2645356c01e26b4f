//! Deterministic conversion of structured relations into stored triplets.
//!
//! Given identical structurer output the builder always produces the same
//! triplets in the same order. Noisy records (missing parts, placeholder
//! objects, self-loops) are skipped rather than reported.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::intelligence::canonical::{
    is_garbage_node, is_user_reference, normalize_identifier, normalize_relation,
    MAX_IDENTIFIER_LEN,
};
use crate::models::{CandidateFact, StructuredRelation, SyntheticEntity, Triplet};

const PLACE_RELATIONS: &[&str] = &["LIVES_IN", "FROM", "HOMETOWN", "LOCATED_IN"];
const PROGRAM_RELATIONS: &[&str] = &["DEGREE", "PROGRAM"];
const FIELD_RELATIONS: &[&str] = &["RESEARCH_AREA", "HAS_FIELD"];

const LOCATED_IN: &str = "LOCATED_IN";
const HAS_PROGRAM: &str = "HAS_PROGRAM";
const HAS_FIELD: &str = "HAS_FIELD";
const RESEARCH_AREA: &str = "RESEARCH_AREA";

const PACKED_PROGRAM: &str = "PhD";
const PACKED_PROGRAM_PREFIX: &str = "phd in ";

const SYNTHETIC_HASH_LEN: usize = 8;

/// Stable node id for a reified entity: a readable prefix plus a short hash
/// of `type:label`, so the same entity merges across turns.
pub fn synthetic_node_id(entity_type: &str, label: &str) -> String {
    let entity_type = entity_type.trim().to_lowercase();
    let label = label.trim().to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(format!("{entity_type}:{label}").as_bytes());
    let digest = hasher.finalize();
    let hash = format!("{digest:x}");

    let readable = format!("{entity_type} {label}");
    let mut prefix = if readable.trim().is_empty() {
        String::new()
    } else {
        normalize_identifier(&readable)
    };
    prefix.truncate(MAX_IDENTIFIER_LEN - SYNTHETIC_HASH_LEN - 1);
    let prefix = match prefix.trim_matches('_') {
        "" => "entity",
        trimmed => trimmed,
    };

    format!("{prefix}_{}", &hash[..SYNTHETIC_HASH_LEN])
}

/// Split a packed field list such as `"LLMs, multi-agent systems, and
/// knowledge graph"` on commas and the word "and". Duplicates are removed
/// case-insensitively, first occurrence wins.
pub fn split_field_list(text: &str) -> Vec<String> {
    let normalized = text
        .trim()
        .replace(" & ", " and ")
        .replace(", and ", ", ");

    let parts = normalized
        .split(',')
        .flat_map(|chunk| chunk.split(" and "))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string);

    dedup_case_insensitive(parts)
}

fn dedup_case_insensitive(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

/// `"Melbourne, Australia"` -> `("Melbourne", "Australia")`. Only strings
/// with exactly one comma are split.
fn split_place(text: &str) -> Option<(&str, &str)> {
    if text.matches(',').count() != 1 {
        return None;
    }
    let (city, country) = text.split_once(',')?;
    let (city, country) = (city.trim(), country.trim());
    if city.is_empty() || country.is_empty() {
        return None;
    }
    Some((city, country))
}

fn strip_packed_program(text: &str) -> Option<&str> {
    let head = text.get(..PACKED_PROGRAM_PREFIX.len())?;
    if head.eq_ignore_ascii_case(PACKED_PROGRAM_PREFIX) {
        Some(text[PACKED_PROGRAM_PREFIX.len()..].trim())
    } else {
        None
    }
}

/// Builds the final, deduplicated triplets for one turn.
#[derive(Debug, Clone)]
pub struct TripletBuilder {
    user_id: String,
}

impl TripletBuilder {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: normalize_identifier(user_id),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Turn structurer relations (optionally referencing reified entities by
    /// key) into triplets.
    ///
    /// Degree-like relations on the user pin a program; field-like relations
    /// on the user then hang off that program instead of the user.
    pub fn build(
        &self,
        relations: &[StructuredRelation],
        entities: &[SyntheticEntity],
    ) -> Vec<Triplet> {
        let entity_nodes: HashMap<&str, String> = entities
            .iter()
            .map(|entity| {
                (
                    entity.key.trim(),
                    synthetic_node_id(&entity.entity_type, &entity.label),
                )
            })
            .collect();

        let mut program: Option<String> = None;
        let mut fields: Vec<String> = Vec::new();
        let mut out: Vec<Triplet> = Vec::new();

        for relation in relations {
            let raw_object = relation.object.trim();
            if raw_object.is_empty() || relation.relation.trim().is_empty() {
                continue;
            }
            let Some(subject) = self.resolve(&relation.subject, &entity_nodes) else {
                continue;
            };
            let label = normalize_relation(&relation.relation);
            let on_user = subject == self.user_id;
            let object_is_entity = entity_nodes.contains_key(raw_object);

            if on_user && PROGRAM_RELATIONS.contains(&label.as_str()) {
                if let Some(node) = self.resolve(raw_object, &entity_nodes) {
                    program = Some(node);
                }
                continue;
            }

            if FIELD_RELATIONS.contains(&label.as_str()) && !object_is_entity {
                if on_user {
                    match strip_packed_program(raw_object) {
                        Some(rest) => {
                            program = Some(PACKED_PROGRAM.to_string());
                            fields.extend(split_field_list(rest));
                        }
                        None => fields.extend(split_field_list(raw_object)),
                    }
                } else {
                    for field in split_field_list(raw_object) {
                        self.push(&mut out, &subject, &label, self.resolve_text(&field));
                    }
                }
                continue;
            }

            if PLACE_RELATIONS.contains(&label.as_str()) && !object_is_entity {
                if let Some((city, country)) = split_place(raw_object) {
                    let city = self.resolve_text(city);
                    self.push(&mut out, &subject, &label, city.clone());
                    if let Some(city) = city {
                        self.push(&mut out, &city, LOCATED_IN, self.resolve_text(country));
                    }
                    continue;
                }
            }

            let object = self.resolve(raw_object, &entity_nodes);
            self.push(&mut out, &subject, &label, object);
        }

        let fields = dedup_case_insensitive(fields);
        match program {
            Some(program) => {
                self.push(&mut out, &self.user_id, HAS_PROGRAM, Some(program.clone()));
                for field in &fields {
                    self.push(&mut out, &program, HAS_FIELD, self.resolve_text(field));
                }
            }
            None => {
                for field in &fields {
                    self.push(&mut out, &self.user_id, RESEARCH_AREA, self.resolve_text(field));
                }
            }
        }

        let triplets = dedup(out);
        tracing::debug!(
            relations = relations.len(),
            triplets = triplets.len(),
            "Built triplets from structured relations"
        );
        triplets
    }

    /// Fallback when structuring produced nothing: store curator candidates
    /// as they are, canonicalized.
    pub fn build_flat(&self, candidates: &[CandidateFact]) -> Vec<Triplet> {
        let no_entities = HashMap::new();
        let mut out = Vec::new();

        for candidate in candidates {
            let Some(subject) = self.resolve(&candidate.subject, &no_entities) else {
                continue;
            };
            let label = normalize_relation(&candidate.relation);
            let object = self.resolve_text(&candidate.object);
            self.push(&mut out, &subject, &label, object);
        }

        dedup(out)
    }

    /// Resolve an endpoint: user references fold onto the user node, entity
    /// keys map to synthetic ids, anything else is normalized free text.
    fn resolve(&self, raw: &str, entity_nodes: &HashMap<&str, String>) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.eq_ignore_ascii_case("USER") || is_user_reference(raw) {
            return Some(self.user_id.clone());
        }
        if let Some(node) = entity_nodes.get(raw) {
            return Some(node.clone());
        }
        self.resolve_text(raw)
    }

    fn resolve_text(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if is_garbage_node(raw) {
            return None;
        }
        let id = normalize_identifier(raw);
        if is_garbage_node(&id) {
            return None;
        }
        Some(id)
    }

    fn push(&self, out: &mut Vec<Triplet>, subject: &str, relation: &str, object: Option<String>) {
        let Some(object) = object else {
            return;
        };
        if let Some(triplet) = Triplet::new(subject, relation, object) {
            out.push(triplet);
        }
    }
}

fn dedup(triplets: Vec<Triplet>) -> Vec<Triplet> {
    let mut seen = HashSet::new();
    triplets
        .into_iter()
        .filter(|triplet| seen.insert(triplet.clone()))
        .collect()
}
