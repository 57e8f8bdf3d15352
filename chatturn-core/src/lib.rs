//! # chatturn - Conversational Turn Management
//!
//! chatturn sits between a caller and a streaming chat-completion endpoint:
//! - Tracks multi-turn dialogue history
//! - Discards history after a configurable period of inactivity
//! - Assembles the ordered message list sent on every turn
//! - Streams reply fragments back while recording completed turns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatturn_core::prelude::*;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ChatTurnConfig::load()?;
//!     let mut processor = TurnProcessor::from_config(&config)?;
//!
//!     let mut turn = processor.chat("Tell me a joke").await?;
//!     while let Some(fragment) = turn.next().await {
//!         print!("{}", fragment?);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **History store**: ordered records plus the last-activity timestamp
//! - **Turn processor**: idle check, message assembly, provider dispatch
//! - **Turn stream**: yields fragments and commits the turn once drained
//! - **Providers**: the `LLMProvider` trait with an OpenAI-compatible implementation

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ChatTurnConfig, LLMProviderConfig, ProcessorConfig};
    pub use crate::conversation::{HistoryStore, TurnProcessor, TurnStream};
    pub use crate::error::{ChatTurnError, Result};
    pub use crate::llm::providers::OpenAIProvider;
    pub use crate::llm::{
        FragmentStream, LLMProvider, LLMProviderFactory, LLMRequest, Message, MessageRole,
        ModelInfo, ModelParams,
    };
}
