//! Shell command surface: display toggles, exit, and the `/kg` family.

use chrono::NaiveDateTime;

use crate::db::FactStore;
use crate::error::Result;
use crate::services::qa::MemoryQa;
use crate::services::session::Session;

pub const KG_USAGE: &str = "Please provide a subcommand or question after \"/kg\":\n\
  /kg clean              wipe stored memories\n\
  /kg show recent        show recent memories\n\
  /kg remove <pattern>   remove matching memories\n\
  /kg <question>         ask a memory question";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KgCommand {
    Usage,
    Clean,
    Show,
    /// `None` when no pattern was given.
    Remove(Option<String>),
    Ask(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    ToggleCurator(bool),
    ToggleEnricher(bool),
    Kg(KgCommand),
    /// Ordinary conversation.
    Message(String),
}

impl Command {
    /// Conflict answers are only looked for in plain messages.
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message(_))
    }
}

pub fn parse_command(input: &str) -> Command {
    let input = input.trim();
    let lower = input.to_lowercase();

    match lower.as_str() {
        "/curator on" | "curator on" => return Command::ToggleCurator(true),
        "/curator off" | "curator off" => return Command::ToggleCurator(false),
        "/enricher on" | "enricher on" => return Command::ToggleEnricher(true),
        "/enricher off" | "enricher off" => return Command::ToggleEnricher(false),
        "exit" | "quit" | "/exit" | "/quit" => return Command::Exit,
        _ => {}
    }

    match input.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("/kg") => {
            let rest = &input[3..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Command::Kg(parse_kg(rest.trim()));
            }
            Command::Message(input.to_string())
        }
        _ => Command::Message(input.to_string()),
    }
}

fn parse_kg(sub: &str) -> KgCommand {
    if sub.is_empty() {
        return KgCommand::Usage;
    }

    let mut parts = sub.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default().to_lowercase();
    let tail = parts.next().map(str::trim).filter(|rest| !rest.is_empty());

    match head.as_str() {
        "clean" if tail.is_none() => KgCommand::Clean,
        "show" => KgCommand::Show,
        "remove" => KgCommand::Remove(tail.map(str::to_string)),
        _ => KgCommand::Ask(sub.to_string()),
    }
}

/// Run a `/kg` command and render its output for the shell. Pending
/// conflicts whose new fact no longer exists are dropped from `session`.
pub async fn execute_kg(
    command: &KgCommand,
    store: &dyn FactStore,
    qa: &MemoryQa,
    session: &mut Session,
    recent_limit: usize,
    now: NaiveDateTime,
) -> Result<String> {
    match command {
        KgCommand::Usage => Ok(KG_USAGE.to_string()),
        KgCommand::Clean => {
            let removed = store.clear().await?;
            let dropped = session.clear_conflicts();
            tracing::info!(removed, dropped, "Memory store wiped");
            Ok("I have erased everything in the knowledge graph.".to_string())
        }
        KgCommand::Show => {
            let facts = store.recent_facts(recent_limit).await?;
            if facts.is_empty() {
                return Ok("No memories stored yet.".to_string());
            }
            let mut lines = vec![format!("Showing {} most recent memories:", facts.len())];
            lines.extend(
                facts
                    .iter()
                    .enumerate()
                    .map(|(i, fact)| format!("  {}. {}", i + 1, fact.log_line())),
            );
            Ok(lines.join("\n"))
        }
        KgCommand::Remove(None) => {
            Ok("Please provide a pattern to remove, e.g. \"/kg remove War Thunder\".".to_string())
        }
        KgCommand::Remove(Some(pattern)) => {
            let removed = store.delete_matching(pattern).await?;
            if removed > 0 {
                drop_stale_conflicts(store, session).await?;
            }
            if removed == 0 {
                Ok(format!("No memories matched pattern: {pattern:?}"))
            } else {
                tracing::info!(removed, %pattern, "Removed memories by pattern");
                Ok(format!("Removed {removed} memories matching {pattern:?}."))
            }
        }
        KgCommand::Ask(question) => qa.answer(question, now).await,
    }
}

async fn drop_stale_conflicts(store: &dyn FactStore, session: &mut Session) -> Result<()> {
    let mut stale = Vec::new();
    for pending in session.conflicts() {
        let record = &pending.record;
        if !store
            .fact_exists(&record.subject, &record.relation, &record.new_object)
            .await?
        {
            stale.push(record.new_key());
        }
    }
    if stale.is_empty() {
        return Ok(());
    }

    let dropped = session.retain_conflicts(|pending| !stale.contains(&pending.record.new_key()));
    tracing::info!(dropped, "Dropped pending conflicts whose fact was removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_toggles_and_exit() {
        assert_eq!(parse_command("/curator off"), Command::ToggleCurator(false));
        assert_eq!(parse_command("Curator ON"), Command::ToggleCurator(true));
        assert_eq!(parse_command("/enricher on "), Command::ToggleEnricher(true));
        assert_eq!(parse_command("enricher off"), Command::ToggleEnricher(false));
        assert_eq!(parse_command("QUIT"), Command::Exit);
        assert_eq!(parse_command("/exit"), Command::Exit);
    }

    #[test]
    fn test_kg_subcommands() {
        assert_eq!(parse_command("/kg"), Command::Kg(KgCommand::Usage));
        assert_eq!(parse_command("/KG clean"), Command::Kg(KgCommand::Clean));
        assert_eq!(parse_command("/kg show recent"), Command::Kg(KgCommand::Show));
        assert_eq!(
            parse_command("/kg remove War Thunder"),
            Command::Kg(KgCommand::Remove(Some("War Thunder".to_string())))
        );
        assert_eq!(parse_command("/kg remove"), Command::Kg(KgCommand::Remove(None)));
        assert_eq!(
            parse_command("/kg where do I live?"),
            Command::Kg(KgCommand::Ask("where do I live?".to_string()))
        );
        assert_eq!(
            parse_command("/kg clean up my room yesterday?"),
            Command::Kg(KgCommand::Ask("clean up my room yesterday?".to_string()))
        );
    }

    #[test]
    fn test_plain_messages() {
        assert_eq!(
            parse_command("I live in Melbourne"),
            Command::Message("I live in Melbourne".to_string())
        );
        assert_eq!(parse_command("/kgfoo"), Command::Message("/kgfoo".to_string()));
        assert!(parse_command("A").is_message());
        assert!(!parse_command("/kg show").is_message());
    }
}
