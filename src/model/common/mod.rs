mod position;
mod voter;

pub use position::{Position, Positions, PositionsError};
pub use voter::{CorrelationToken, VoterStatus};
