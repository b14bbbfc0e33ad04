//! Test utilities for runtime testing
//!
//! Runs a single function made of raw instructions, bypassing the builder's
//! validation, so interpreter tests can exercise exact instruction
//! sequences.
