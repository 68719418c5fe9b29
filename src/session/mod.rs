//! Conversation history.
//!
//! A [`Conversation`] is the in-memory, append-only `{role, content}` history handed to the
//! orchestrator by its caller. Nothing is persisted beyond it.
//!
//! # Example
//!
//! ```rust
//! use hybrid_rag::session::Conversation;
//!
//! let mut conversation = Conversation::new();
//! conversation.push_user("What is the best strategy?");
//! conversation.append_assistant("To win without fighting.");
//!
//! assert_eq!(conversation.len(), 2);
//! ```

mod thread;

pub use thread::Conversation;
