//! Personal knowledge-graph memory for a conversational assistant.
//!
//! Utterances flow through a curator (candidate filtering), a structurer
//! (entity-centric restructuring), the triplet builder and the conflict
//! engine before landing in a libsql-backed fact store. Stored facts can be
//! queried back with time-scoped questions.

pub mod config;
pub mod db;
pub mod error;
pub mod intelligence;
pub mod llm;
pub mod models;
pub mod services;
