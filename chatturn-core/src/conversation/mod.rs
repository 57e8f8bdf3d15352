//! Conversation Turn Management
//!
//! Multi-turn dialogue over a streaming provider, with history that expires
//! after a period of inactivity.
//!
//! # Features
//!
//! - Ordered user/assistant history, committed once per completed turn
//! - Lazy idle-timeout reset evaluated at the start of each turn
//! - Deterministic message assembly (system, history, current user message)
//! - Reply streaming with commit-on-drain semantics
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use chatturn_core::conversation::TurnProcessor;
//!
//! let mut processor = TurnProcessor::new(provider, ProcessorConfig::default())?;
//!
//! let mut turn = processor.chat("Hello!").await?;
//! while let Some(fragment) = turn.next().await {
//!     print!("{}", fragment?);
//! }
//! drop(turn);
//!
//! assert_eq!(processor.history_len(), 2);
//! ```

mod history;
mod processor;
mod turn;

pub use history::HistoryStore;
pub use processor::TurnProcessor;
pub use turn::TurnStream;
