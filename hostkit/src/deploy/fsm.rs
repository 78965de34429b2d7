//! Finite state machine for one deploy attempt

use serde::{Deserialize, Serialize};

/// Deploy phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployPhase {
    /// Not started
    Pending,

    /// Breaker and rate limit checks
    Admitting,

    /// Inspecting the source tree
    Classifying,

    /// Writing into the app directory
    Syncing,

    /// Appending to the ledger
    Recording,

    /// Running the project's migration
    Migrating,

    /// Finished successfully
    Completed,

    /// Finished with an error
    Failed,
}

impl DeployPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployPhase::Completed | DeployPhase::Failed)
    }
}

/// Deploy event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// Begin the attempt
    Start,

    /// Both gates passed
    Admitted,

    /// Build type known
    Classified,

    /// Files are in place
    Synced,

    /// Ledger written; `migrate` says whether a migration follows
    Recorded { migrate: bool },

    /// Migration finished
    Migrated,

    /// Any step failed
    Fail,
}

/// Deploy FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    phase: DeployPhase,
    failed_in: Option<DeployPhase>,
}

impl DeployFsm {
    /// Create a new FSM in pending phase
    pub fn new() -> Self {
        Self {
            phase: DeployPhase::Pending,
            failed_in: None,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> DeployPhase {
        self.phase
    }

    /// Phase that was active when the attempt failed
    pub fn failed_in(&self) -> Option<DeployPhase> {
        self.failed_in
    }

    /// Whether the attempt has touched the app directory.
    ///
    /// Failures after this point must be written to the ledger.
    pub fn mutation_started(&self) -> bool {
        let phase = match self.phase {
            DeployPhase::Failed => match self.failed_in {
                Some(phase) => phase,
                None => return false,
            },
            phase => phase,
        };
        matches!(
            phase,
            DeployPhase::Syncing
                | DeployPhase::Recording
                | DeployPhase::Migrating
                | DeployPhase::Completed
        )
    }

    /// Process an event and transition phase
    pub fn process(&mut self, event: DeployEvent) -> Result<DeployPhase, String> {
        let next = match (self.phase, &event) {
            (DeployPhase::Pending, DeployEvent::Start) => DeployPhase::Admitting,
            (DeployPhase::Admitting, DeployEvent::Admitted) => DeployPhase::Classifying,
            (DeployPhase::Classifying, DeployEvent::Classified) => DeployPhase::Syncing,
            (DeployPhase::Syncing, DeployEvent::Synced) => DeployPhase::Recording,
            (DeployPhase::Recording, DeployEvent::Recorded { migrate: true }) => {
                DeployPhase::Migrating
            }
            (DeployPhase::Recording, DeployEvent::Recorded { migrate: false }) => {
                DeployPhase::Completed
            }
            (DeployPhase::Migrating, DeployEvent::Migrated) => DeployPhase::Completed,

            (phase, DeployEvent::Fail) if !phase.is_terminal() => {
                self.failed_in = Some(phase);
                DeployPhase::Failed
            }

            // Invalid transitions
            (phase, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", phase, event));
            }
        };

        self.phase = next;
        Ok(next)
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}
