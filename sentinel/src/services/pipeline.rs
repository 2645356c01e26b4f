use std::sync::Arc;

use crate::config::StructurerStrategy;
use crate::db::FactStore;
use crate::error::{Result, SentinelError};
use crate::intelligence::conflict::interpret_choice;
use crate::intelligence::{
    ConflictEngine, ConflictExplanation, Curator, CuratorResult, StructuredOutput, Structurer,
    TripletBuilder,
};
use crate::llm::TextCompletion;
use crate::models::{make_timestamp, ConflictRecord, Fact, ResolutionChoice, Triplet};
use crate::services::session::{PendingConflict, Session};

/// Everything that happened to one utterance on its way into the store.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    pub timestamp: String,
    pub curator: CuratorResult,
    pub structured: StructuredOutput,
    pub stored: Vec<Fact>,
    /// Triplets already present in the store at some timestamp.
    pub skipped: Vec<Triplet>,
    /// Conflicts raised this turn, in the order they were detected.
    pub conflicts: Vec<PendingConflict>,
    pub used_flat_fallback: bool,
}

/// Outcome of answering the conflict at the head of the queue.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub choice: ResolutionChoice,
    pub record: ConflictRecord,
    /// The next conflict waiting for an answer, if any.
    pub next: Option<ConflictExplanation>,
}

/// Filter, structure, build, conflict-check, store.
///
/// Store failures abort the turn and propagate; model failures only shrink
/// what gets remembered.
pub struct MemoryPipeline {
    store: Arc<dyn FactStore>,
    curator: Curator,
    structurer: Structurer,
    builder: TripletBuilder,
    conflicts: ConflictEngine,
}

impl MemoryPipeline {
    pub fn new(
        store: Arc<dyn FactStore>,
        llm: Arc<dyn TextCompletion>,
        strategy: StructurerStrategy,
        user_id: &str,
    ) -> Self {
        Self {
            store,
            curator: Curator::new(llm.clone()),
            structurer: Structurer::new(llm.clone(), strategy),
            builder: TripletBuilder::new(user_id),
            conflicts: ConflictEngine::new(llm),
        }
    }

    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }

    pub fn user_id(&self) -> &str {
        self.builder.user_id()
    }

    pub async fn process(&self, session: &mut Session, utterance: &str) -> Result<TurnReport> {
        self.process_at(session, utterance, &make_timestamp()).await
    }

    /// Run one turn with an explicit turn timestamp shared by every fact
    /// written in it.
    pub async fn process_at(
        &self,
        session: &mut Session,
        utterance: &str,
        timestamp: &str,
    ) -> Result<TurnReport> {
        let mut report = TurnReport {
            timestamp: timestamp.to_string(),
            curator: self.curator.run(utterance).await,
            ..TurnReport::default()
        };

        if !report.curator.has_candidates() {
            tracing::debug!("Curator kept nothing, skipping consolidation");
            return Ok(report);
        }

        report.structured = self
            .structurer
            .run(&report.curator.clean_text, &report.curator.candidates)
            .await;

        let mut triplets = self
            .builder
            .build(&report.structured.relations, &report.structured.entities);
        if triplets.is_empty() {
            triplets = self.builder.build_flat(&report.curator.candidates);
            report.used_flat_fallback = !triplets.is_empty();
            if report.used_flat_fallback {
                tracing::info!(
                    count = triplets.len(),
                    "Structurer produced nothing, storing curator candidates"
                );
            }
        }

        for triplet in triplets {
            if self
                .store
                .fact_exists(triplet.subject(), triplet.relation(), triplet.object())
                .await?
            {
                tracing::debug!(fact = %triplet, "Fact already stored, skipping");
                report.skipped.push(triplet);
                continue;
            }

            let fact = triplet.at(timestamp);
            let previous = self.conflicts.detect(self.store.as_ref(), &fact).await?;
            self.store.insert_fact(&fact).await?;
            tracing::info!(
                subject = %fact.subject(),
                relation = %fact.relation(),
                object = %fact.object(),
                timestamp = %fact.timestamp(),
                "Stored fact"
            );

            if !previous.is_empty() {
                let record = ConflictRecord {
                    subject: fact.subject().to_string(),
                    relation: fact.relation().to_string(),
                    new_object: fact.object().to_string(),
                    new_timestamp: fact.timestamp().to_string(),
                    old: previous,
                };
                let explanation = self.conflicts.explain(&record).await;
                let pending = PendingConflict {
                    record,
                    explanation,
                };
                report.conflicts.push(pending.clone());
                session.push_conflict(pending);
            }

            report.stored.push(fact);
        }

        Ok(report)
    }

    /// Treat `reply` as an answer to the oldest pending conflict.
    ///
    /// Returns `None` when nothing is pending or the reply is not a choice;
    /// the caller then handles it as ordinary conversation. A conflict whose
    /// new fact has since been removed is discarded and also yields `None`.
    /// Any other store failure leaves the conflict queued.
    pub async fn try_resolve(&self, session: &mut Session, reply: &str) -> Result<Option<Resolved>> {
        let Some(pending) = session.current_conflict() else {
            return Ok(None);
        };
        let Some(choice) = interpret_choice(reply) else {
            return Ok(None);
        };

        match self
            .conflicts
            .apply(self.store.as_ref(), choice, &pending.record)
            .await
        {
            Ok(()) => {}
            Err(SentinelError::NotFound(reason)) => {
                tracing::warn!(%reason, "Discarding stale conflict");
                session.pop_conflict();
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let Some(resolved) = session.pop_conflict() else {
            return Ok(None);
        };
        Ok(Some(Resolved {
            choice,
            record: resolved.record,
            next: session
                .current_conflict()
                .map(|pending| pending.explanation.clone()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, DisplayConfig};
    use crate::db::{Database, LibSqlBackend};
    use crate::llm::{prompts, CompletionOptions};
    use crate::models::FactStatus;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers curator and structurer calls from queues; everything else fails.
    #[derive(Default)]
    struct Scripted {
        curator: Mutex<VecDeque<String>>,
        structurer: Mutex<VecDeque<String>>,
    }

    impl Scripted {
        fn turn(self, curator: &str, structurer: &str) -> Self {
            self.curator.lock().unwrap().push_back(curator.to_string());
            self.structurer
                .lock()
                .unwrap()
                .push_back(structurer.to_string());
            self
        }
    }

    #[async_trait]
    impl TextCompletion for Scripted {
        async fn complete(
            &self,
            system_prompt: &str,
            _user_prompt: &str,
            _options: Option<&CompletionOptions>,
        ) -> Result<String> {
            let queue = if system_prompt == prompts::CURATOR_SYSTEM_PROMPT {
                &self.curator
            } else if system_prompt.starts_with("You are \"Enricher\"") {
                &self.structurer
            } else {
                return Err(SentinelError::Llm("not scripted".to_string()));
            };
            queue
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SentinelError::Llm("script exhausted".to_string()))
        }
    }

    async fn memory_store() -> Arc<dyn FactStore> {
        let db = Database::new(&DatabaseConfig {
            url: ":memory:".to_string(),
            auth_token: None,
            local_path: None,
        })
        .await
        .unwrap();
        Arc::new(LibSqlBackend::new(db))
    }

    fn session() -> Session {
        Session::new(
            &DisplayConfig {
                show_curator: false,
                show_enricher: false,
            },
            4,
        )
    }

    const LIVES_MELBOURNE: &str = r#"{"clean_text": "I live in Melbourne.", "candidates": [{"subj": "USER", "rel": "LIVES_IN", "obj": "Melbourne"}], "notes": []}"#;
    const LIVES_SYDNEY: &str = r#"{"clean_text": "I live in Sydney.", "candidates": [{"subj": "USER", "rel": "LIVES_IN", "obj": "Sydney"}], "notes": []}"#;

    fn lives_in(city: &str) -> String {
        format!(
            r#"{{"entities": [], "relations": [{{"subj": "USER", "rel": "LIVES_IN", "obj": "{city}"}}], "notes": []}}"#
        )
    }

    #[tokio::test]
    async fn test_nothing_to_remember() {
        let llm = Scripted::default().turn(
            r#"{"clean_text": "", "candidates": [], "notes": ["small talk"]}"#,
            "{}",
        );
        let store = memory_store().await;
        let pipeline = MemoryPipeline::new(store.clone(), Arc::new(llm), StructurerStrategy::Reifying, "User");

        let report = pipeline.process_at(&mut session(), "hi there", "t1").await.unwrap();
        assert!(report.stored.is_empty());
        assert_eq!(report.curator.notes, vec!["small talk"]);
        assert!(store.all_facts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_facts_are_skipped() {
        let llm = Scripted::default()
            .turn(LIVES_MELBOURNE, &lives_in("Melbourne"))
            .turn(LIVES_MELBOURNE, &lives_in("Melbourne"));
        let store = memory_store().await;
        let pipeline = MemoryPipeline::new(store.clone(), Arc::new(llm), StructurerStrategy::Reifying, "User");
        let mut session = session();

        let first = pipeline.process_at(&mut session, "I live in Melbourne", "t1").await.unwrap();
        let second = pipeline.process_at(&mut session, "I live in Melbourne", "t2").await.unwrap();

        assert_eq!(first.stored.len(), 1);
        assert!(second.stored.is_empty());
        assert_eq!(second.skipped.len(), 1);
        assert_eq!(store.all_facts().await.unwrap().len(), 1);
        assert!(!session.has_pending_conflict());
    }

    #[tokio::test]
    async fn test_flat_fallback_when_structurer_fails() {
        let llm = Scripted::default().turn(LIVES_MELBOURNE, "not json at all");
        let store = memory_store().await;
        let pipeline = MemoryPipeline::new(store.clone(), Arc::new(llm), StructurerStrategy::Flat, "User");

        let report = pipeline.process_at(&mut session(), "I live in Melbourne", "t1").await.unwrap();
        assert!(report.used_flat_fallback);
        assert_eq!(report.structured.notes, vec!["Invalid JSON from Enricher."]);
        assert_eq!(report.stored[0].triplet().to_string(), "User -[LIVES_IN]-> Melbourne");
    }

    #[tokio::test]
    async fn test_conflict_then_resolve_a() {
        let llm = Scripted::default()
            .turn(LIVES_MELBOURNE, &lives_in("Melbourne"))
            .turn(LIVES_SYDNEY, &lives_in("Sydney"));
        let store = memory_store().await;
        let pipeline = MemoryPipeline::new(store.clone(), Arc::new(llm), StructurerStrategy::Reifying, "User");
        let mut session = session();

        pipeline.process_at(&mut session, "I live in Melbourne", "t1").await.unwrap();
        let report = pipeline.process_at(&mut session, "I live in Sydney", "t2").await.unwrap();

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].record.old[0].object, "Melbourne");
        assert!(session.has_pending_conflict());

        assert!(pipeline
            .try_resolve(&mut session, "what's for dinner?")
            .await
            .unwrap()
            .is_none());
        assert!(session.has_pending_conflict());

        let resolved = pipeline.try_resolve(&mut session, "A").await.unwrap().unwrap();
        assert_eq!(resolved.choice, ResolutionChoice::A);
        assert!(resolved.next.is_none());
        assert!(!session.has_pending_conflict());

        let statuses: Vec<(String, Option<FactStatus>)> = store
            .all_facts()
            .await
            .unwrap()
            .into_iter()
            .map(|fact| (fact.object, fact.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("Melbourne".to_string(), Some(FactStatus::Past)),
                ("Sydney".to_string(), Some(FactStatus::Current)),
            ]
        );
    }

    #[tokio::test]
    async fn test_conflict_on_deleted_fact_is_discarded() {
        let llm = Scripted::default()
            .turn(LIVES_MELBOURNE, &lives_in("Melbourne"))
            .turn(LIVES_SYDNEY, &lives_in("Sydney"));
        let store = memory_store().await;
        let pipeline = MemoryPipeline::new(store.clone(), Arc::new(llm), StructurerStrategy::Reifying, "User");
        let mut session = session();

        pipeline.process_at(&mut session, "I live in Melbourne", "t1").await.unwrap();
        pipeline.process_at(&mut session, "I live in Sydney", "t2").await.unwrap();
        assert!(session.has_pending_conflict());

        assert_eq!(store.delete_matching("sydney").await.unwrap(), 1);

        let outcome = pipeline.try_resolve(&mut session, "I like both").await.unwrap();
        assert!(outcome.is_none());
        assert!(!session.has_pending_conflict());

        let melbourne = &store.all_facts().await.unwrap()[0];
        assert_eq!(melbourne.object, "Melbourne");
        assert_eq!(melbourne.status, None);
    }

    #[tokio::test]
    async fn test_try_resolve_without_pending_conflict() {
        let store = memory_store().await;
        let pipeline = MemoryPipeline::new(store, Arc::new(Scripted::default()), StructurerStrategy::Reifying, "User");
        assert!(pipeline.try_resolve(&mut session(), "A").await.unwrap().is_none());
    }
}
