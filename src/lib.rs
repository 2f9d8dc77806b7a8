//! Fruitcut - round-based fruit cutting wager server
//!
//! Players place a wager, cut fruits from timed rounds to multiply it, and
//! cash out before hitting a losing fruit. Balances live in an external
//! ledger; this crate runs the rounds, the wager state machine and the
//! debit/credit discipline around it.

pub mod api;
pub mod clock;
pub mod config;
pub mod directory;
pub mod errors;
pub mod game;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod money;
pub mod protocol;
pub mod queue;
pub mod store;
pub mod testing;

pub use config::AppConfig;
pub use errors::{ErrorKind, FruitcutError, FruitcutResult, GameError, GameResult};
pub use game::GameEngine;
