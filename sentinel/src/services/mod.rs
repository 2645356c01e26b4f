mod chat;
pub mod commands;
mod pipeline;
mod qa;
mod session;

pub use chat::{ChatAgent, CHAT_APOLOGY};
pub use commands::{execute_kg, parse_command, Command, KgCommand};
pub use pipeline::{MemoryPipeline, Resolved, TurnReport};
pub use qa::{MemoryQa, NO_MEMORIES};
pub use session::{ChatRole, ChatTurn, PendingConflict, Session};
