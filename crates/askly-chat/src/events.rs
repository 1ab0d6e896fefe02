//! Events published by the engine while a send is in flight

/// Progress and enrichment notifications for one session
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// One streamed reply fragment arrived
    Fragment {
        session_id: String,
        content: String,
    },
    /// The session's live message list changed and should be re-rendered
    SessionUpdated { session_id: String },
    /// The reply finished and the session was persisted
    Completed {
        session_id: String,
        message_id: String,
    },
    /// Generation failed and the fallback reply was appended instead
    Fallback { session_id: String },
    /// Background analysis detected a topic change
    TopicChanged {
        session_id: String,
        topic: String,
    },
    /// Background analysis stored new memories
    MemoriesUpdated { count: usize },
    /// The placeholder title was replaced
    TitleGenerated {
        session_id: String,
        title: String,
    },
}
