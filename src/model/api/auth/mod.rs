mod session;
mod voter;

pub use session::{Session, SESSION_COOKIE};
pub use voter::SessionVoter;
