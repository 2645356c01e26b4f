mod candidate;
mod conflict;
mod fact;
mod window;

pub use candidate::*;
pub use conflict::*;
pub use fact::*;
pub use window::*;
