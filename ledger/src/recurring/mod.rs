//! # Recurring Module — Standing Payment Instructions
//!
//! "Pay rent on the 1st" as data: an owner, a receiver, an amount, a
//! frequency, and the next due time. A sweep finds everything due and
//! pushes it through the ordinary transfer pipeline; there is no second
//! money-moving code path to keep honest.
//!
//! ## Architecture
//!
//! ```text
//! instruction.rs — Frequency (calendar math), RecurringInstruction, errors
//! store.rs       — InstructionStore: records + owner index + due-time index
//! scheduler.rs   — RecurringScheduler: create, list, and the due sweep
//! ```
//!
//! ## Scheduling Semantics
//!
//! - The first due time is one full period after creation.
//! - On success the next due time advances from the *previous* due time,
//!   not from the sweep time, so schedules never drift.
//! - On failure the instruction is left untouched and retried on the next
//!   sweep. At-least-once, never silently dropped.
//! - Sweeps are explicit (`run_due(now)`) and never overlap; the service
//!   decides when to call one.

pub mod instruction;
pub mod scheduler;
pub mod store;

pub use instruction::{
    Frequency, InstructionId, RecurringInstruction, ScheduleError, ScheduleResult,
};
pub use scheduler::{RecurringScheduler, SweepReport};
pub use store::InstructionStore;
