//! Round and wager lifecycle

pub mod connections;
pub mod engine;
pub mod generator;
pub mod locks;
pub mod scheduler;
pub mod settlement;
pub mod timeouts;
pub mod types;
pub mod wager;

pub use connections::{ConnectionRegistry, Outbox};
pub use engine::{EndTrigger, EngineDeps, GameEngine};
pub use scheduler::RoundScheduler;
pub use settlement::LedgerCoordinator;
pub use timeouts::{TimeoutSupervisor, TimerTable};
pub use types::*;
pub use wager::CommitOutcome;
