use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a learned memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Preference,
    Personal,
    Fact,
    Goal,
    Context,
}

impl MemoryKind {
    /// All kinds, in the order the presentation layer groups them
    pub const ALL: [MemoryKind; 5] = [
        MemoryKind::Personal,
        MemoryKind::Preference,
        MemoryKind::Goal,
        MemoryKind::Fact,
        MemoryKind::Context,
    ];

    /// Human-readable group label
    pub fn label(&self) -> &'static str {
        match self {
            MemoryKind::Preference => "Preferences",
            MemoryKind::Personal => "Personal Details",
            MemoryKind::Fact => "Facts",
            MemoryKind::Goal => "Goals",
            MemoryKind::Context => "Other Context",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryKind::Preference => write!(f, "preference"),
            MemoryKind::Personal => write!(f, "personal"),
            MemoryKind::Fact => write!(f, "fact"),
            MemoryKind::Goal => write!(f, "goal"),
            MemoryKind::Context => write!(f, "context"),
        }
    }
}

/// A durable, cross-session fact or preference inferred about the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    /// Create a memory with a fresh id and clamped importance
    pub fn new(kind: MemoryKind, content: impl Into<String>, importance: f32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            importance: clamp_importance(importance),
            created_at: Utc::now(),
        }
    }

    /// Synthesize a memory from a raw extraction item
    pub fn from_draft(draft: MemoryDraft) -> Self {
        Self::new(draft.kind, draft.content, draft.importance)
    }

    /// Visual intensity in dots, never negative even for malformed input
    pub fn importance_dots(&self) -> usize {
        (clamp_importance(self.importance) * 3.0).ceil() as usize
    }
}

/// A raw extraction item from the model, before it becomes a `Memory`
///
/// `importance` tolerates being absent in provider output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDraft {
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub content: String,
    #[serde(default)]
    pub importance: f32,
}

/// Clamp a provider-supplied importance into [0, 1]
///
/// NaN and negative values map to 0.
fn clamp_importance(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
