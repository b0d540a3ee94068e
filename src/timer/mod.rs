//! Timer module for the focus timer.
//!
//! This module contains the timer state machine and its scheduling helpers:
//! - `engine`: pure transitions, phase cycling and load reconciliation
//! - `schedule`: single-slot delayed tasks for debounced saves and auto-advance

pub mod engine;
pub mod schedule;

pub use engine::{
    next_phase, reconcile_loaded, transition, TimerAction, TimerEngine, TimerEvent,
};
pub use schedule::TaskSlot;
