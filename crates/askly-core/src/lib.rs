pub mod constants;
pub mod types;

pub use constants::{DEFAULT_TITLE, INITIAL_GREETING};
pub use types::{
    ConversationSession,
    Memory,
    MemoryDraft,
    MemoryKind,
    Message,
    MessageId,
    Role,
    TopicDetection,
};
