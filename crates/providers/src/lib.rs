//! # troupe-providers
//!
//! Completion provider implementations for troupe. The engine only knows
//! the [`Provider`] trait from `troupe-core`; this crate supplies the
//! production backend for OpenAI-compatible endpoints.
//!
//! [`Provider`]: troupe_core::Provider

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
