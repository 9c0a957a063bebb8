//! Relay core: moderation, routing, and the dispatch pipeline.

pub mod pipeline;
pub mod router;
pub mod scorer;
pub mod state;

pub use pipeline::RelayPipeline;
pub use router::ConversationRouter;
pub use scorer::AdScorer;
