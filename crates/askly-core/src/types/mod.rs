pub mod analysis;
pub mod memory;
pub mod message;
pub mod session;

pub use analysis::TopicDetection;
pub use memory::{Memory, MemoryDraft, MemoryKind};
pub use message::{Message, MessageId, Role};
pub use session::ConversationSession;
