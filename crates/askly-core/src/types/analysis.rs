use serde::{Deserialize, Serialize};

/// Result of the topic-change analysis over a recent conversation window
///
/// Field names match the structured-completion contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicDetection {
    pub topic_changed: bool,
    #[serde(default)]
    pub new_topic: Option<String>,
}

impl TopicDetection {
    /// A detection that reports no change
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// The new topic, if the analysis both flagged a change and supplied one
    pub fn effective_topic(&self) -> Option<&str> {
        if !self.topic_changed {
            return None;
        }
        self.new_topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
