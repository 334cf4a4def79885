//! Round orchestration for the Convoy simulation.
//!
//! This crate owns the round cycle that drives every rider once per round:
//! inbox, opinion update, direction, governance, allocation, membership,
//! actions and messages, apply.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `convoy-config.yaml` into
//!   strongly-typed structs.
//! - [`environment`] -- The [`Environment`] seam to the world and
//!   [`ScriptedEnvironment`] for tests.
//! - [`round`] -- The phase loop for a single round.
//! - [`runner`] -- The bounded multi-round loop.
//!
//! [`Environment`]: environment::Environment
//! [`ScriptedEnvironment`]: environment::ScriptedEnvironment

pub mod config;
pub mod environment;
pub mod round;
pub mod runner;
