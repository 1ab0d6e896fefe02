/// Title a session carries until one is generated from its content.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Greeting inserted as the first model message of a fresh session.
pub const INITIAL_GREETING: &str =
    "Hello! I'm Askly. I can remember our context and conversations. What's on your mind?";
