//! Integration tests for guard-daemon.
//!
//! These tests drive the assembled service through its public surface:
//! - Guardrail decisions against configured profiles
//! - Kill switch halting and position cleanup
//! - Conditional order lifecycle over market ticks

pub mod common;
