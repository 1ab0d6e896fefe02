//! Prompt templates and builders for the chat and analysis calls

use askly_core::{Memory, Message};

pub const SYSTEM_INSTRUCTION: &str = "\
You are Askly, a highly capable, context-aware AI assistant.
Your goal is to provide helpful, natural, and accurate responses.
You have access to a \"memory\" of the user's preferences and past context, which will be provided in the prompt if available.
Always adapt to the user's tone. If the user asks about what you remember, refer to the provided context.";

pub const TOPIC_DETECTION_PROMPT: &str = "\
Analyze if the conversation topic has changed based on the recent messages.
Respond ONLY with a JSON object:
{
    \"topic_changed\": true/false,
    \"new_topic\": \"topic name or null\"
}";

pub const MEMORY_EXTRACTION_PROMPT: &str = "\
Analyze this conversation exchange and identify important information to remember about the user or the context.
Ignore trivial chit-chat. Focus on facts, preferences, goals, and names.
Respond ONLY with a JSON array:
[
    {
        \"type\": \"preference|personal|fact|goal|context\",
        \"content\": \"information to remember\",
        \"importance\": 0.0-1.0
    }
]";

/// System instruction enriched with the memory set and current topic
pub fn build_system_instruction(memories: &[Memory], topic: Option<&str>) -> String {
    let memory_context = memories
        .iter()
        .map(|m| format!("- [{}] {}", m.kind.to_string().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nCurrent Topic: {}\nRelevant Memories:\n{}",
        SYSTEM_INSTRUCTION,
        topic.unwrap_or("General"),
        memory_context
    )
}

/// Topic-detection prompt over a recent conversation window
pub fn build_topic_prompt(recent: &[Message], current_topic: Option<&str>) -> String {
    let history = render_history(recent);
    format!(
        "{}\n\nCurrent Topic: {}\n\nRecent History:\n{}",
        TOPIC_DETECTION_PROMPT,
        current_topic.unwrap_or("None"),
        history
    )
}

/// Memory-extraction prompt over one user/assistant exchange
pub fn build_extraction_prompt(user_message: &str, model_reply: &str) -> String {
    format!(
        "{}\n\nUser: {}\nAssistant: {}",
        MEMORY_EXTRACTION_PROMPT, user_message, model_reply
    )
}

/// Title-generation prompt over the opening messages
pub fn build_title_prompt(opening: &[Message]) -> String {
    let sample = render_history(opening);
    format!(
        "Based on the following conversation start, generate a very short, concise title (3-6 words maximum). Do not use quotes. Conversation:\n{}",
        sample
    )
}

fn render_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
