//! Purpose: Library crate behind the `stackwire` CLI and tests.
//! Exports: `api` (marshaller surface), `core` (values, shapes, codec, guard, errors),
//! `reference` (in-memory interpreter), `script` (JSON operation scripts).
//! Role: Protocol adapter between structured network-building calls and a stack interpreter.
//! Invariants: The interpreter is reached only through `StackChannel`; no global hooks.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod reference;
pub mod script;
