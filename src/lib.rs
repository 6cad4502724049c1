//! A Sokoban engine built around a push-optimal solver and a solution
//! optimizer.
//!
//! [`solve`] proves whether a board is solvable and returns a
//! push-minimal lurd solution; [`optimize`] takes any valid solution and
//! searches the configurations near it for a strictly better one under a
//! chosen metric. Boards come in as the usual text format, solutions go
//! in and out as lurd strings.

pub mod bits;
pub mod board;
pub mod boxconf;
pub mod context;
pub mod corral;
pub mod deadlock;
pub mod deadlock_db;
pub mod error;
pub mod goal_room;
pub mod levels;
pub mod lower_bound;
pub mod lurd;
pub mod metrics;
pub mod optimizer;
pub mod pqueue;
pub mod reach;
pub mod solver;
pub mod tunnel;
pub mod verifier;
pub mod vicinity;
pub mod zobrist;

pub use board::Board;
pub use boxconf::BoxConfiguration;
pub use context::SearchContext;
pub use error::Error;
pub use levels::Levels;
pub use metrics::Metric;
pub use optimizer::{Optimized, OptimizerSettings, optimize};
pub use solver::{Method, Solution, SolverOptions, solve};
pub use verifier::{SolutionMetrics, verify};
