//! # Askly LLM
//!
//! Model access for Askly: the [`ModelGateway`] trait the chat engine
//! depends on, and [`HttpGateway`], its OpenAI-compatible HTTP
//! implementation with SSE streaming.

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod prompts;

pub use config::GatewayConfig;
pub use error::{LlmError, Result};
pub use gateway::{ModelGateway, TokenStream};
pub use http::HttpGateway;
