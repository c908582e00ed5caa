//! Test selection and ordering.
//!
//! The optimizer resolves each candidate unit to the tests the snapshot
//! knows under its name, keeps the units that previously failed or are
//! affected by a source change, and orders what is kept so failures
//! surface early. Whenever something needed is missing it keeps every
//! unit in the order given.

mod local;
mod optimizable;
mod session;


pub use local::{LocalSnapshotOptimizer, Optimizer};
pub use optimizable::{ClassOptimizable, Optimizable, PathOptimizable, SuiteOptimizable};
pub use session::OptimizationSession;
