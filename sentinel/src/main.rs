use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel::config::{Config, StructurerStrategy};
use sentinel::db::{Database, FactStore, LibSqlBackend};
use sentinel::intelligence::{CuratorResult, StructuredOutput};
use sentinel::llm::{LlmProvider, TextCompletion};
use sentinel::services::{
    execute_kg, parse_command, ChatAgent, Command, MemoryPipeline, MemoryQa, Session, TurnReport,
};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Chat shell that remembers what you tell it in a personal knowledge graph")]
struct Args {
    /// Override DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Override STRUCTURER_STRATEGY (flat or reifying)
    #[arg(long)]
    structurer: Option<StructurerStrategy>,

    /// Start with curator and enricher output hidden
    #[arg(long)]
    quiet: bool,
}

fn print_banner(user_id: &str) {
    println!("Canonical user id: {user_id}");
    println!("\nPERSONAL KG CHAT");
    println!("Commands:");
    println!("  /kg clean              wipe stored KG");
    println!("  /kg show recent        show recent KG memories");
    println!("  /kg remove <pattern>   remove memories");
    println!("  /kg <question>         ask a memory question");
    println!("  /curator on|off        toggle curator output");
    println!("  /enricher on|off       toggle enricher output");
    println!("  exit | quit            end the session\n");
}

fn print_curator(result: &CuratorResult) {
    let clean = if result.clean_text.is_empty() {
        "(empty)"
    } else {
        result.clean_text.as_str()
    };
    println!("[CURATOR] clean_text: {clean}");
    if result.candidates.is_empty() {
        println!("[CURATOR] candidates: (none)");
    } else {
        println!("[CURATOR] candidates:");
        for c in &result.candidates {
            println!(
                "  - {}  {}  {}   (conf={:.2})",
                c.subject, c.relation, c.object, c.confidence
            );
        }
    }
    print_notes("CURATOR", &result.notes);
}

fn print_enricher(output: &StructuredOutput) {
    if output.entities.is_empty() {
        println!("[ENRICHER] entities: (none)");
    } else {
        println!("[ENRICHER] entities:");
        for e in &output.entities {
            match &e.time_text {
                Some(time) => println!("  - {}  ({})  {}   time={}", e.key, e.entity_type, e.label, time),
                None => println!("  - {}  ({})  {}", e.key, e.entity_type, e.label),
            }
        }
    }
    if output.relations.is_empty() {
        println!("[ENRICHER] relations: (none)");
    } else {
        println!("[ENRICHER] relations:");
        for r in &output.relations {
            println!(
                "  - {}  {}  {}   (conf={:.2})",
                r.subject, r.relation, r.object, r.confidence
            );
        }
    }
    print_notes("ENRICHER", &output.notes);
}

fn print_notes(tag: &str, notes: &[String]) {
    if notes.is_empty() {
        println!("[{tag}] notes: (none)\n");
    } else {
        println!("[{tag}] notes: {}\n", notes.join("; "));
    }
}

fn print_report(report: &TurnReport, session: &Session) {
    if session.show_curator {
        print_curator(&report.curator);
    }
    if session.show_enricher && report.curator.has_candidates() {
        print_enricher(&report.structured);
    }

    for fact in &report.stored {
        println!("[KG] STORE [{}] {}", fact.timestamp(), fact.triplet());
    }

    for raised in &report.conflicts {
        let is_current = session
            .current_conflict()
            .is_some_and(|pending| pending.record.slot() == raised.record.slot());
        if is_current {
            println!("\nAssistant (memory):\n{}\n", raised.explanation.render());
        } else {
            println!(
                "[KG] Conflict on {} {} queued behind the current question.",
                raised.record.subject, raised.record.relation
            );
        }
    }
}

fn prompt() {
    print!("You: ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sentinel=info".into());
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut config = Config::from_env();
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if let Some(strategy) = args.structurer {
        config.memory.structurer = strategy;
    }
    if args.quiet {
        config.display.show_curator = false;
        config.display.show_enricher = false;
    }

    tracing::info!(url = %config.database.url, "Initializing fact store...");
    let db = Database::new(&config.database).await?;
    let store: Arc<dyn FactStore> = Arc::new(LibSqlBackend::new(db.clone()));

    if let Some(llm_config) = &config.llm {
        tracing::info!("Initializing LLM provider: {}...", llm_config.model);
    }
    let provider = LlmProvider::new(config.llm.as_ref());
    if !provider.is_available() {
        tracing::warn!("LLM unavailable - replies and memory extraction will be disabled");
    }
    let llm: Arc<dyn TextCompletion> = Arc::new(provider);

    let user_id = config.user_canonical_id();
    let pipeline = MemoryPipeline::new(store.clone(), llm.clone(), config.memory.structurer, &user_id);
    let chat = ChatAgent::new(llm.clone());
    let qa = MemoryQa::new(store.clone(), llm, config.memory.qa_max_records);
    let mut session = Session::new(&config.display, config.memory.chat_history_turns);

    tracing::info!(
        user_id = %pipeline.user_id(),
        structurer = %config.memory.structurer,
        "Session started"
    );
    print_banner(pipeline.user_id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let Some(line) = lines.next_line().await? else {
            println!("\nExiting chat.");
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let command = parse_command(input);
        match &command {
            Command::ToggleCurator(on) => {
                session.show_curator = *on;
                println!("Curator output: {}\n", if *on { "ON" } else { "OFF" });
                continue;
            }
            Command::ToggleEnricher(on) => {
                session.show_enricher = *on;
                println!("Enricher output: {}\n", if *on { "ON" } else { "OFF" });
                continue;
            }
            _ => {}
        }

        if command.is_message() && session.has_pending_conflict() {
            match pipeline.try_resolve(&mut session, input).await {
                Ok(Some(resolved)) => {
                    println!(
                        "Assistant (KG): Memory updated based on your decision ({}).\n",
                        resolved.choice
                    );
                    if let Some(next) = resolved.next {
                        println!("Assistant (memory):\n{}\n", next.render());
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Failed to apply conflict resolution");
                    continue;
                }
            }
        }

        let message = match command {
            Command::Kg(kg) => {
                let now = chrono::Local::now().naive_local();
                let output = execute_kg(
                    &kg,
                    store.as_ref(),
                    &qa,
                    &mut session,
                    config.memory.recent_facts_limit,
                    now,
                )
                .await;
                match output {
                    Ok(output) => println!("Assistant (KG):\n{output}\n"),
                    Err(e) => tracing::error!(error = %e, "Memory command failed"),
                }
                continue;
            }
            Command::Exit => {
                println!("Goodbye.");
                break;
            }
            Command::Message(message) => message,
            Command::ToggleCurator(_) | Command::ToggleEnricher(_) => continue,
        };

        let reply = chat.reply(&session, &message).await;
        println!("\nAssistant: {reply}\n");
        session.record_exchange(&message, &reply);

        match pipeline.process(&mut session, &message).await {
            Ok(report) => print_report(&report, &session),
            Err(e) => tracing::error!(error = %e, "Memory pipeline failed for this turn"),
        }
    }

    if let Err(e) = db.sync().await {
        tracing::warn!(error = %e, "Final database sync failed");
    }
    println!("\nSESSION ENDED");
    println!("Your knowledge graph remains in {} until you erase it.", config.database.url);
    Ok(())
}
