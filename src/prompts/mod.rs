//! Prompt module for LLM-based operations.
//!
//! This module provides modular prompt templates for various LLM tasks.

pub mod relevance_score;

pub use relevance_score::*;
