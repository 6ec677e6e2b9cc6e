//! Periodic I/O simulation tasks.
//!
//! Each task is an independent thread that computes a value (or values)
//! via a [`function::SimFunction`], writes them into a [`plc_memory::MemorySpace`]
//! slice, and sleeps for its configured pause before repeating. Tasks are
//! mutually independent: a panic or a bounds failure in one terminates
//! only that task.
//!
//! - **Operators** ([`operator`]): the named binary reductions `operation`
//!   simulations use.
//! - **Task configuration** ([`task`]): converts the config schema's
//!   per-simulation table into a validated, ready-to-run task.
//! - **Function semantics** ([`function`]): one tick of each of the
//!   thirteen simulation function kinds.
//! - **Runner** ([`simulator`]): spawns and shuts down the task threads.

pub mod function;
pub mod operator;
pub mod simulator;
pub mod task;

pub use operator::Operator;
pub use simulator::IoSimulator;
pub use task::{MemspaceRef, Operand, SimulationTaskConfig};
