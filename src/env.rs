//! The append-only execution log produced by a single interpreter run.

use std::fmt;

/// Outcome of one round, as recorded in the [`Env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundStatus {
    /// Every survivor request succeeded and the cache was extended.
    Completed,
    /// A request was missing identities or came back empty; the round
    /// (and the program) failed.
    Failed {
        /// Human-readable description of the failure, for display only.
        reason: String,
    },
}

/// One completed round of the interpreter: which identities were already
/// cached, which were actually requested from a source, and how it went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    /// Index of this round within the run, starting at zero.
    pub index: usize,
    /// Source name to the identities served straight from cache this round.
    pub cached: Vec<(String, Vec<String>)>,
    /// Source name to the identities actually fetched this round.
    pub fetched: Vec<(String, Vec<String>)>,
    /// How the round ended.
    pub status: RoundStatus,
}

/// The append-only log of rounds executed during one [`crate::interpreter`]
/// run. Cloning an `Env` is cheap: the round list is shared via `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    rounds: std::sync::Arc<Vec<Round>>,
}

impl Env {
    /// An empty log, as seen before the first round runs.
    pub fn new() -> Self {
        Env::default()
    }

    /// The rounds executed so far, in order.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// How many rounds have completed (successfully or not).
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Total identities fetched from a source (not served from cache)
    /// across every round -- the quantity the deduplication property
    /// bounds.
    pub fn total_fetched(&self) -> usize {
        self.rounds
            .iter()
            .flat_map(|r| r.fetched.iter())
            .map(|(_, ids)| ids.len())
            .sum()
    }

    pub(crate) fn push(&self, round: Round) -> Env {
        let mut rounds = (*self.rounds).clone();
        rounds.push(round);
        Env {
            rounds: std::sync::Arc::new(rounds),
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Env ({} round(s)):", self.rounds.len())?;
        for round in self.rounds.iter() {
            writeln!(f, "  round {}: {:?}", round.index, round.status)?;
        }
        Ok(())
    }
}
