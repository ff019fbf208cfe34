use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::ledger::PracticeLedger;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuestError {
    #[error("A micro-quest needs at least one question")]
    Empty,

    #[error("Micro-quest {0} is already complete")]
    AlreadyComplete(String),
}

/// Aggregated view of quest progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestSummary {
    pub quest_id: String,
    pub total: usize,
    pub correct: usize,
    /// Rounded down.
    pub accuracy_percent: u8,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MicroQuestSession {
    quest_id: String,
    total: usize,
    answered: usize,
    correct: usize,
    completed_at: Option<DateTime<Utc>>,
}

impl MicroQuestSession {
    pub fn new(quest_id: impl Into<String>, total: usize) -> Result<Self, QuestError> {
        if total == 0 {
            return Err(QuestError::Empty);
        }
        Ok(Self {
            quest_id: quest_id.into(),
            total,
            answered: 0,
            correct: 0,
            completed_at: None,
        })
    }

    pub fn quest_id(&self) -> &str {
        &self.quest_id
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn progress(&self) -> QuestProgress {
        QuestProgress {
            total: self.total,
            answered: self.answered,
            remaining: self.total - self.answered,
            is_complete: self.is_complete(),
        }
    }

    /// Record an answer. The final answer completes the quest and logs one
    /// practice run; a ledger write failure is logged and does not undo the
    /// answer.
    pub fn answer(&mut self, correct: bool, ledger: &PracticeLedger) -> Result<QuestProgress, QuestError> {
        if self.is_complete() {
            return Err(QuestError::AlreadyComplete(self.quest_id.clone()));
        }

        self.answered += 1;
        if correct {
            self.correct += 1;
        }

        if self.answered == self.total {
            self.completed_at = Some(Utc::now());
            info!(
                quest = %self.quest_id,
                correct = self.correct,
                total = self.total,
                "Micro-quest complete"
            );
            if let Err(e) = ledger.record_run() {
                warn!(quest = %self.quest_id, error = %e, "Failed to record practice run");
            }
        }

        Ok(self.progress())
    }

    pub fn summary(&self) -> QuestSummary {
        let accuracy_percent = (self.correct * 100 / self.total).min(100) as u8;
        QuestSummary {
            quest_id: self.quest_id.clone(),
            total: self.total,
            correct: self.correct,
            accuracy_percent,
            completed_at: self.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::clock::FixedClock;
    use crate::config::LedgerOptions;
    use crate::store::MemoryStore;

    fn ledger() -> PracticeLedger {
        PracticeLedger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())),
            LedgerOptions::default(),
        )
    }

    #[test]
    fn test_empty_quest_rejected() {
        assert_eq!(MicroQuestSession::new("q", 0).unwrap_err(), QuestError::Empty);
    }

    #[test]
    fn test_completion_records_exactly_one_run() {
        let ledger = ledger();
        let mut quest = MicroQuestSession::new("fractions-1", 3).unwrap();

        let progress = quest.answer(true, &ledger).unwrap();
        assert_eq!(progress.remaining, 2);
        assert!(!progress.is_complete);
        assert_eq!(ledger.today_count(), 0);

        quest.answer(false, &ledger).unwrap();
        let progress = quest.answer(true, &ledger).unwrap();

        assert!(progress.is_complete);
        assert_eq!(progress.remaining, 0);
        assert_eq!(ledger.today_count(), 1);
    }

    #[test]
    fn test_answer_after_completion_is_error() {
        let ledger = ledger();
        let mut quest = MicroQuestSession::new("q", 1).unwrap();
        quest.answer(true, &ledger).unwrap();

        let err = quest.answer(true, &ledger).unwrap_err();
        assert_eq!(err, QuestError::AlreadyComplete("q".to_string()));
        assert_eq!(ledger.today_count(), 1);
    }

    #[test]
    fn test_summary_accuracy_rounds_down() {
        let ledger = ledger();
        let mut quest = MicroQuestSession::new("q", 3).unwrap();
        quest.answer(true, &ledger).unwrap();
        quest.answer(true, &ledger).unwrap();
        quest.answer(false, &ledger).unwrap();

        let summary = quest.summary();
        assert_eq!(summary.correct, 2);
        assert_eq!(summary.accuracy_percent, 66);
        assert!(summary.completed_at.is_some());
    }
}
