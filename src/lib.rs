//! promptgate: a completion gateway that defends against prompt injection.
//!
//! Feature calls pass through an input guard, get framed as untrusted data,
//! and reach the completion service through per-purpose credentials with
//! bounded retry. Scraped page metadata is cached on disk and sanitised
//! before it is ever placed in a prompt.

pub mod config;
pub mod error;
pub mod features;
pub mod guard;
pub mod i18n;
pub mod inference;
pub mod metadata;
pub mod prompts;
pub mod telemetry;
pub mod types;
