//! rvdb: an RV32IM instruction-set emulator with a built-in debugger.
//!
//! The [`vm`] module holds the fetch/decode/execute engine and the
//! execution-state machine, [`sdb`] the interactive debugger and its
//! expression evaluator.

pub mod config;
pub mod error;
pub mod sdb;
pub mod ui;
pub mod vm;

pub use config::MachineConfig;
pub use error::{ConfigError, ExprError, PatternError, RunError, VmError};
pub use vm::{Machine, RunState, UNBOUNDED};
