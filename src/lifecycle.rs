//! One-shot setup lifecycle.
//!
//! ```text
//!  NotSeeded --Create--> Seeding --ok--> Seeded
//!      ^                    |               |  Create / Update / Delete
//!      +-------failed-------+               +--> Seeded (no action)
//! ```
//!
//! `Update` and `Delete` never seed, and neither does a `Create` that
//! arrives while another seed is in flight. `NotSeeded -> Seeding` is a
//! compare-and-swap on the ledger, so only one caller wins it.
//!
//! A `Seeding` state left behind by a process that died midway is cleared
//! by [`SetupLifecycle::recover`] at startup.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{SetupLedger, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SetupState {
    #[default]
    NotSeeded,
    Seeding,
    Seeded,
}

/// Kind of orchestrator event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Seed,
    Skip,
}

pub fn plan(state: SetupState, request: RequestType) -> Step {
    match (request, state) {
        (RequestType::Create, SetupState::NotSeeded) => Step::Seed,
        _ => Step::Skip,
    }
}

pub fn settle(seeded: bool) -> SetupState {
    if seeded {
        SetupState::Seeded
    } else {
        SetupState::NotSeeded
    }
}

/// Drives [`plan`]/[`settle`] against a persisted ledger.
#[derive(Clone)]
pub struct SetupLifecycle {
    ledger: Arc<dyn SetupLedger>,
}

impl SetupLifecycle {
    pub fn new(ledger: Arc<dyn SetupLedger>) -> Self {
        Self { ledger }
    }

    pub fn state(&self) -> Result<SetupState, StoreError> {
        self.ledger.load()
    }

    /// Decides what `request` should do and, when it seeds, records `Seeding`
    /// before the caller starts writing. A caller that loses the race to
    /// `Seeding` gets [`Step::Skip`].
    pub fn begin(&self, request: RequestType) -> Result<Step, StoreError> {
        let current = self.ledger.load()?;
        let mut step = plan(current, request);
        if step == Step::Seed && !self.ledger.transition(current, SetupState::Seeding)? {
            step = Step::Skip;
        }
        info!(?current, ?request, ?step, "Setup lifecycle step");
        Ok(step)
    }

    /// Resets a `Seeding` state left by an earlier run so the next `Create`
    /// seeds again. Call once per process, before any event is handled.
    pub fn recover(&self) -> Result<SetupState, StoreError> {
        if self.ledger.transition(SetupState::Seeding, SetupState::NotSeeded)? {
            warn!("Interrupted seed found; setup state reset to NotSeeded");
        }
        self.ledger.load()
    }

    pub fn finish(&self, seeded: bool) -> Result<SetupState, StoreError> {
        let next = settle(seeded);
        self.ledger.save(next)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryLedger, SetupLedger};

    #[test]
    fn only_create_before_seeded_seeds() {
        use RequestType::*;
        use SetupState::*;

        assert_eq!(plan(NotSeeded, Create), Step::Seed);
        assert_eq!(plan(Seeding, Create), Step::Skip);
        assert_eq!(plan(Seeded, Create), Step::Skip);
        for state in [NotSeeded, Seeding, Seeded] {
            assert_eq!(plan(state, Update), Step::Skip);
            assert_eq!(plan(state, Delete), Step::Skip);
        }
    }

    #[test]
    fn begin_marks_seeding_then_finish_settles() {
        let lifecycle = SetupLifecycle::new(Arc::new(MemoryLedger::new()));
        assert_eq!(lifecycle.begin(RequestType::Create).unwrap(), Step::Seed);
        assert_eq!(lifecycle.state().unwrap(), SetupState::Seeding);

        assert_eq!(lifecycle.finish(true).unwrap(), SetupState::Seeded);
        assert_eq!(lifecycle.begin(RequestType::Create).unwrap(), Step::Skip);
        assert_eq!(lifecycle.state().unwrap(), SetupState::Seeded);
    }

    #[test]
    fn failed_seed_allows_another_create() {
        let lifecycle = SetupLifecycle::new(Arc::new(MemoryLedger::new()));
        lifecycle.begin(RequestType::Create).unwrap();
        assert_eq!(lifecycle.finish(false).unwrap(), SetupState::NotSeeded);
        assert_eq!(lifecycle.begin(RequestType::Create).unwrap(), Step::Seed);
    }

    #[test]
    fn create_during_seeding_is_skipped() {
        let lifecycle = SetupLifecycle::new(Arc::new(MemoryLedger::new()));
        assert_eq!(lifecycle.begin(RequestType::Create).unwrap(), Step::Seed);
        assert_eq!(lifecycle.begin(RequestType::Create).unwrap(), Step::Skip);
        assert_eq!(lifecycle.state().unwrap(), SetupState::Seeding);
    }

    #[test]
    fn concurrent_creates_seed_once() {
        let lifecycle = SetupLifecycle::new(Arc::new(MemoryLedger::new()));
        let seeds = (0..8)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                std::thread::spawn(move || lifecycle.begin(RequestType::Create).unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|step| *step == Step::Seed)
            .count();
        assert_eq!(seeds, 1);
    }

    #[test]
    fn recover_clears_interrupted_seed() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.save(SetupState::Seeding).unwrap();
        let lifecycle = SetupLifecycle::new(ledger);
        assert_eq!(lifecycle.recover().unwrap(), SetupState::NotSeeded);
        assert_eq!(lifecycle.begin(RequestType::Create).unwrap(), Step::Seed);
    }

    #[test]
    fn recover_keeps_settled_states() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.save(SetupState::Seeded).unwrap();
        let lifecycle = SetupLifecycle::new(ledger);
        assert_eq!(lifecycle.recover().unwrap(), SetupState::Seeded);
    }

    #[test]
    fn update_and_delete_leave_state_alone() {
        let lifecycle = SetupLifecycle::new(Arc::new(MemoryLedger::new()));
        assert_eq!(lifecycle.begin(RequestType::Update).unwrap(), Step::Skip);
        assert_eq!(lifecycle.begin(RequestType::Delete).unwrap(), Step::Skip);
        assert_eq!(lifecycle.state().unwrap(), SetupState::NotSeeded);
    }
}
