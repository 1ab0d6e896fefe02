//! # Askly Chat
//!
//! The conversation orchestrator ([`ChatEngine`]) and the events it
//! publishes while a send is in flight.

pub mod engine;
pub mod events;

pub use engine::{ChatEngine, EngineError, EngineResult, SendOutcome, FALLBACK_REPLY};
pub use events::ChatEvent;
