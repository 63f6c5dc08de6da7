//! Shopdesk assistant runtime.
//!
//! Turns a free-text customer message into a grounded reply:
//! - classifies the message into an intent (`intent`)
//! - extracts order ids and search phrases (`conversation`)
//! - performs at most two backend lookups per message (`tools`, `backend`)
//! - grounds policy questions on the knowledge base (`knowledge`)
//! - answers from fixed templates or through the generation service (`templates`, `prompt`, `llm`)
//! - scrubs generated text and checks citations (`guardrails`)
//!
//! # Safety Principle
//!
//! The generation service only rephrases. Order data, product lists and policy
//! answers come from the backend and the knowledge base, and every reply that
//! depends on them has a deterministic fallback when generation is unavailable.

pub mod backend;
pub mod bootstrap;
pub mod conversation;
pub mod guardrails;
pub mod intent;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod runtime;
pub mod stats;
pub mod templates;
pub mod tools;

pub use bootstrap::{build_runtime, BootstrapError};
pub use runtime::{AgentRuntime, AssistantReply, MessageContext};
