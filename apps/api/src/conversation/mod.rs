//! The chat side of the service: the per-user state machine, the review
//! pipeline it drives, and the payment reducer that shares its session store.

pub mod machine;
pub mod messages;
pub mod payment;
pub mod pipeline;

pub use machine::{Conversation, ConversationDeps, InboundMessage};
pub use pipeline::ReviewServices;
