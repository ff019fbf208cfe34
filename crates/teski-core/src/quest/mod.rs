//! Micro-quest exercise sessions.
//!
//! A micro-quest is a short run of questions. Finishing the last one counts
//! as one practice run in the `PracticeLedger`.

pub mod session;

pub use session::{MicroQuestSession, QuestError, QuestProgress, QuestSummary};
