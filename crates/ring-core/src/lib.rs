//! # ring-core — trait and wire-format definitions for the ring engine
//!
//! This crate defines the trait boundaries and shared-memory wire formats
//! for every axis of variability in the engine: the ring protocol, the
//! request lifecycle, op dispatch, resource tables, the readiness poller,
//! the worker pool, and the completion path. Default (safe) implementations
//! live in `ring-rt`; the dispatcher loop that drives them lives in
//! `ring-engine`.
//!
//! ## Design principle
//!
//! > "Program to the interface. Start safe. Optimize with a new impl,
//! >  not by modifying the existing one."
//!
//! Every component depends on traits from this crate, never on concrete
//! types from `ring-rt`. Swapping an implementation is a type-alias change.

pub mod cancel;
pub mod completion;
pub mod descriptor;
pub mod error;
pub mod notifier;
pub mod op;
pub mod opcode;
pub mod poller;
pub mod request;
pub mod resource;
pub mod ring;
pub mod shared;
pub mod worker;
