// Re-export modules for the binary and integration tests
pub mod api; // REST collaborator
pub mod auth;
pub mod chat; // Chat session core
pub mod config;
pub mod error;
pub mod models;
pub mod realtime; // Socket events and transports
pub mod story; // Story playback

// Re-export main types for convenience
pub use chat::{ChatSession, SessionCommand, SessionContext, SessionEvent};
pub use error::{ClientError, ClientResult};
pub use models::*;
pub use story::{StoryPlayer, StoryViewer};
