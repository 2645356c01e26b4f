//! Prompt templates for the memory pipeline roles.
//!
//! Each role has a fixed system prompt and a small `format!()`-built user
//! prompt carrying the turn's input.

use serde_json::json;

use crate::config::StructurerStrategy;
use crate::models::{CandidateFact, ConflictRecord, StoredFact};

/// System prompt for the candidate filter ("Curator").
pub const CURATOR_SYSTEM_PROMPT: &str = r#"You are "Curator", a strict memory filter for a personal assistant.

Given a user's message, extract ONLY the parts worth remembering long-term. Return:
1) clean_text: a short rewrite that contains only memory-worthy information.
2) candidates: candidate facts (triples) grounded ONLY in the user's text.
3) notes: brief notes about what you removed and why.

ABSOLUTE RULES:
- Do NOT invent facts or add common knowledge the user did not state.
- Do NOT infer geography, taxonomy, institutions, or relationships that are not explicit.
- If unsure, omit it.
- Output JSON only, no markdown.

MEMORY-WORTHY:
A) Stable profile facts: name, age, origin, hometown, nationality, current location,
   education or work status, persistent likes and dislikes.
B) Plans, commitments and events: meetings, appointments, deadlines, reminders, tasks.
   Keep the purpose/topic of an event even when phrased casually ("it'll be about X").
C) Relationships between explicit entities stated directly by the user.

NOT MEMORY-WORTHY:
- greetings and smalltalk directed at the assistant
- rhetorical questions, or questions about external things
- assistant-directed requests that are not durable facts

RELATION LABELS (UPPER_SNAKE_CASE):
NAME, AGE, FROM, HOMETOWN, NATIONALITY, LIVES_IN, STUDIES_IN, WORKS_AS,
DEGREE, PROGRAM, RESEARCH_AREA, HAS_EVENT, HAS_TASK, EVENT_TIME, TASK_TIME,
EVENT_TOPIC, TASK_TOPIC, REMINDER_REQUESTED

Use subj "USER" for the user, never the assistant. Use obj as a short natural string.

OUTPUT SCHEMA (strict JSON object):
{
  "clean_text": "string",
  "candidates": [
    {"subj": "USER", "rel": "REL", "obj": "OBJ", "confidence": 0.0-1.0}
  ],
  "notes": ["string"]
}

EXAMPLE
User: "My name is Paul. I'm living in Melbourne, Australia doing my PhD in AI and multi-agent systems."
Output:
{
  "clean_text": "User name is Paul. User lives in Melbourne, Australia. User is doing a PhD in AI and multi-agent systems.",
  "candidates": [
    {"subj": "USER", "rel": "NAME", "obj": "Paul", "confidence": 0.95},
    {"subj": "USER", "rel": "LIVES_IN", "obj": "Melbourne, Australia", "confidence": 0.9},
    {"subj": "USER", "rel": "DEGREE", "obj": "PhD", "confidence": 0.85},
    {"subj": "USER", "rel": "RESEARCH_AREA", "obj": "AI", "confidence": 0.8},
    {"subj": "USER", "rel": "RESEARCH_AREA", "obj": "multi-agent systems", "confidence": 0.8}
  ],
  "notes": []
}"#;

const STRUCTURER_RULES: &str = r#"You are "Enricher", a knowledge-graph structuring agent.

INPUT:
- clean_text: a cleaned factual summary
- candidates: extracted factual relations

GOAL:
Restructure the facts into a better graph form WITHOUT inventing new facts.

STRICT RULES:
- DO NOT invent information or guess missing links.
- ONLY reorganize facts explicitly present. If unsure, keep the structure flat.
- USER always refers to the same real person.
- DO NOT create abstract placeholder entities.
- For NAME and AGE keep literal values (e.g. "Paul", "24").
- If an object is "City, Country", you MAY also add City LOCATED_IN Country.
- DO NOT merge unrelated concepts.

Preferred relations:
NAME, AGE, FROM, HOMETOWN, LIVES_IN, STUDIES_AT, WORKS_AS, DEGREE, PROGRAM,
RESEARCH_AREA, HAS_FIELD, HAS_BACKGROUND, LOCATED_IN"#;

const STRUCTURER_FLAT_SCHEMA: &str = r#"OUTPUT:
Return JSON ONLY in this schema:
{
  "relations": [
    {"subj": "USER|string", "rel": "string", "obj": "string", "confidence": 0.0-1.0, "derived": true}
  ],
  "notes": ["string"]
}"#;

const STRUCTURER_REIFYING_SCHEMA: &str = r#"REIFICATION:
Events, tasks and programs mentioned with attributes (time, topic, fields) become
entities. Give each entity a short key such as "E1" and use that key as subj or obj
in relations, so its attributes hang off the entity instead of the user.
Example: a meeting today at 4PM about cooking becomes entity
{"key": "E1", "type": "EVENT", "label": "meeting", "time_text": "today 4PM"} with
relations USER HAS_EVENT E1, E1 EVENT_TIME "today 4PM", E1 EVENT_TOPIC "cooking".

OUTPUT:
Return JSON ONLY in this schema:
{
  "entities": [
    {"key": "E1", "type": "EVENT|TASK|PROGRAM|string", "label": "string", "time_text": "string or null"}
  ],
  "relations": [
    {"subj": "USER|entity key|string", "rel": "string", "obj": "entity key|string", "confidence": 0.0-1.0, "derived": true}
  ],
  "notes": ["string"]
}"#;

/// System prompt for the structurer ("Enricher"), by strategy.
///
/// # Example
/// ```
/// use sentinel::config::StructurerStrategy;
/// use sentinel::llm::prompts::structurer_system_prompt;
///
/// assert!(structurer_system_prompt(StructurerStrategy::Reifying).contains("entities"));
/// assert!(!structurer_system_prompt(StructurerStrategy::Flat).contains("entities"));
/// ```
pub fn structurer_system_prompt(strategy: StructurerStrategy) -> String {
    let schema = match strategy {
        StructurerStrategy::Flat => STRUCTURER_FLAT_SCHEMA,
        StructurerStrategy::Reifying => STRUCTURER_REIFYING_SCHEMA,
    };
    format!("{STRUCTURER_RULES}\n\n{schema}")
}

/// System prompt for the conversational reply.
pub const CHAT_SYSTEM_PROMPT: &str = "You are an AI assistant that is getting to know the user over time.\n\
You chat naturally, ask follow-up questions, and remember what the user tells you, \
but memory storage is handled externally.\n\
Focus on a natural, helpful conversation.\n\
Do not mention databases or knowledge graphs unless the user explicitly asks.";

/// System prompt for the conflict explainer.
pub const CONFLICT_SYSTEM_PROMPT: &str = r#"You are an explainable memory module. The system detected a conflict between previously stored facts and a new fact about the same subject and relation.

You must:
1) Briefly explain the conflict in natural language.
2) Offer exactly three options labeled "A", "B" and "C":
   - A: The old fact is outdated; the new fact is now correct.
   - B: Both facts are true (for example, different time periods or multiple roles).
   - C: The new fact is incorrect; keep the old one.

Return JSON ONLY:
{
  "explanation": "string",
  "options": [{"label": "A", "text": "string"}, {"label": "B", "text": "string"}, {"label": "C", "text": "string"}]
}"#;

/// System prompt for memory question answering.
pub const MEMORY_QA_SYSTEM_PROMPT: &str = r#"You are an assistant that answers questions using ONLY the provided memory log, a list of time-stamped facts in the form:
[timestamp] subject -[relation]-> object

Identity rule:
- Any subject named 'user', 'I', 'you', 'speaker', or similar refers to the SAME real-world person: the human user.
- That person is NOT you. You are a separate AI assistant.

Describe what the user told you in the second person, for example "You told me that you like cooking Vietnamese dishes", not "I cook Vietnamese dishes".

Do not invent facts that the log does not support. If the answer cannot be determined, say you are not sure."#;

/// User prompt for the conversational reply: recent `(speaker, text)` turns
/// followed by the new message.
///
/// # Example
/// ```
/// use sentinel::llm::prompts::chat_prompt;
///
/// let prompt = chat_prompt(&[("User", "Hi"), ("Assistant", "Hello!")], "I moved to Sydney");
/// assert!(prompt.contains("Assistant: Hello!"));
/// assert!(prompt.ends_with("User: I moved to Sydney"));
/// ```
pub fn chat_prompt(history: &[(&str, &str)], utterance: &str) -> String {
    if history.is_empty() {
        return format!("User: {utterance}");
    }

    let conversation = history
        .iter()
        .map(|(speaker, text)| format!("{speaker}: {text}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("Conversation so far:\n{conversation}\n\nUser: {utterance}")
}

/// User prompt for the curator.
///
/// # Example
/// ```
/// use sentinel::llm::prompts::curator_prompt;
///
/// let prompt = curator_prompt("I live in Melbourne");
/// assert!(prompt.contains("I live in Melbourne"));
/// ```
pub fn curator_prompt(utterance: &str) -> String {
    format!(
        "User message:\n{utterance}\n\nReturn JSON only following the schema."
    )
}

/// User prompt for the structurer: the cleaned text and the candidates as JSON.
pub fn structurer_prompt(clean_text: &str, candidates: &[CandidateFact]) -> String {
    let payload = json!({
        "clean_text": clean_text,
        "candidates": candidates,
    });
    format!("Input:\n{payload}\n\nReturn JSON in the required schema only.")
}

/// User prompt for the conflict explainer.
pub fn conflict_prompt(record: &ConflictRecord) -> String {
    let previous = evidence_log(&record.old);
    let new_fact = record.new_fact_line();
    format!(
        "Previously stored facts:\n{previous}\n\nNew fact:\n{new_fact}\n\n\
Generate the explanation and the options as instructed."
    )
}

/// User prompt for memory question answering over an evidence log.
///
/// # Example
/// ```
/// use sentinel::llm::prompts::memory_qa_prompt;
///
/// let prompt = memory_qa_prompt("[2025-01-01T10:00:00+00:00] User -[LIVES_IN]-> Melbourne", "Where do I live?");
/// assert!(prompt.contains("Question: Where do I live?"));
/// ```
pub fn memory_qa_prompt(memory_log: &str, question: &str) -> String {
    format!(
        "Here is the memory log:\n------------------------\n{memory_log}\n------------------------\n\n\
Question: {question}\nAnswer based ONLY on the memory log above."
    )
}

/// Render facts as one `[timestamp] s -[r]-> o` line each.
pub fn evidence_log(facts: &[StoredFact]) -> String {
    facts
        .iter()
        .map(StoredFact::log_line)
        .collect::<Vec<_>>()
        .join("\n")
}
