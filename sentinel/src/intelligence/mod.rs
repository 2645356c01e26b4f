pub mod canonical;
pub mod conflict;
pub mod curator;
pub mod response;
pub mod structurer;
pub mod temporal;
pub mod triplets;

pub use conflict::{ConflictEngine, ConflictExplanation};
pub use curator::{Curator, CuratorResult};
pub use structurer::{StructuredOutput, Structurer};
pub use triplets::TripletBuilder;
