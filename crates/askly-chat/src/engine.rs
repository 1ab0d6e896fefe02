//! # ChatEngine
//!
//! Owns the lifecycle of one "send message" operation: optimistic append,
//! streamed generation, completion persistence, parallel background
//! analysis, and conditional title generation. Progress is published as
//! [`ChatEvent`]s so the presentation layer never polls.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use askly_core::{Memory, Message};
use askly_llm::ModelGateway;
use askly_store::{Repository, StorageError};

use crate::events::ChatEvent;

/// Reply shown when the primary generation call fails
pub const FALLBACK_REPLY: &str =
    "I encountered an error connecting to my brain. Please try again.";

/// Window of trailing messages fed to topic detection
const TOPIC_WINDOW: usize = 4;

/// Opening messages fed to title generation
const TITLE_SAMPLE: usize = 4;

/// Minimum message count before a title is generated
const TITLE_MIN_MESSAGES: usize = 2;

/// Engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("a send is already in progress for session {session_id}")]
    Busy { session_id: String },

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Result of one completed send
pub struct SendOutcome {
    pub session_id: String,
    pub reply_id: String,
    /// Full reply text, or the fallback text when generation failed
    pub content: String,
    /// True when the reply is the fallback rather than generated text
    pub recovered: bool,
    /// Background enrichment task, absent on the recovery path
    pub background: Option<JoinHandle<()>>,
}

/// Clears the per-session busy flag on every exit path
struct BusyGuard {
    in_flight: Arc<DashMap<String, ()>>,
    session_id: String,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.session_id);
    }
}

/// The conversation orchestrator
pub struct ChatEngine {
    repo: Arc<Repository>,
    gateway: Arc<dyn ModelGateway>,
    events: UnboundedSender<ChatEvent>,
    in_flight: Arc<DashMap<String, ()>>,
}

impl ChatEngine {
    /// Create the engine and the event stream its callers consume
    pub fn new(
        repo: Arc<Repository>,
        gateway: Arc<dyn ModelGateway>,
    ) -> (Self, UnboundedReceiver<ChatEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let engine = Self {
            repo,
            gateway,
            events,
            in_flight: Arc::new(DashMap::new()),
        };
        (engine, receiver)
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Execute one send against a session
    ///
    /// Rejects empty input and concurrent sends for the same session. A
    /// generation failure degrades to the fallback reply; the user's own
    /// message always survives.
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> EngineResult<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        match self.in_flight.entry(session_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(EngineError::Busy {
                    session_id: session_id.to_string(),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(());
            }
        }
        let _busy = BusyGuard {
            in_flight: self.in_flight.clone(),
            session_id: session_id.to_string(),
        };

        // Phase 1: optimistic append, persisted before generation starts
        let mut session =
            self.repo
                .session(session_id)
                .ok_or_else(|| EngineError::SessionNotFound {
                    id: session_id.to_string(),
                })?;
        session.push_message(Message::user(text));
        self.repo.save_session(session.clone()).await?;

        // Phase 2: streamed generation under a reserved reply id
        let reply_id = Uuid::new_v4().to_string();
        let memories = self.repo.memories();
        let topic = session.topic.clone();

        let mut buffer = String::new();
        let stream_result = self
            .gateway
            .stream_chat(&session.messages, &memories, topic.as_deref())
            .await;

        let failure = match stream_result {
            Ok(mut stream) => {
                let mut failure = None;
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(fragment) => {
                            buffer.push_str(&fragment);
                            self.repo
                                .update_streaming(session_id, &reply_id, &buffer)?;
                            let _ = self.events.send(ChatEvent::Fragment {
                                session_id: session_id.to_string(),
                                content: fragment,
                            });
                            let _ = self.events.send(ChatEvent::SessionUpdated {
                                session_id: session_id.to_string(),
                            });
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                failure
            }
            Err(e) => Some(e),
        };

        if let Some(e) = failure {
            warn!("Generation failed for session {}: {}", session_id, e);
            return self.recover(session_id, &reply_id).await;
        }

        // Phase 3: persist the authoritative record, not the local copy
        let session = self.repo.commit_session(session_id).await?;
        let _ = self.events.send(ChatEvent::Completed {
            session_id: session_id.to_string(),
            message_id: reply_id.clone(),
        });
        debug!(
            "Send completed for session {}: {} chars streamed",
            session_id,
            buffer.len()
        );

        // Phases 4 and 5 run detached from the send itself
        let background = self.spawn_background(
            session_id.to_string(),
            text.to_string(),
            buffer.clone(),
            session.topic.clone(),
        );

        Ok(SendOutcome {
            session_id: session_id.to_string(),
            reply_id,
            content: buffer,
            recovered: false,
            background: Some(background),
        })
    }

    /// Degrade a failed generation to the fixed fallback reply
    ///
    /// Partial streamed content under the reserved id is kept; the
    /// fallback lands as its own trailing message.
    async fn recover(&self, session_id: &str, reply_id: &str) -> EngineResult<SendOutcome> {
        let mut session =
            self.repo
                .session(session_id)
                .ok_or_else(|| EngineError::SessionNotFound {
                    id: session_id.to_string(),
                })?;
        session.push_message(Message::model(FALLBACK_REPLY));
        self.repo.save_session(session).await?;

        let _ = self.events.send(ChatEvent::Fallback {
            session_id: session_id.to_string(),
        });
        let _ = self.events.send(ChatEvent::SessionUpdated {
            session_id: session_id.to_string(),
        });

        Ok(SendOutcome {
            session_id: session_id.to_string(),
            reply_id: reply_id.to_string(),
            content: FALLBACK_REPLY.to_string(),
            recovered: true,
            background: None,
        })
    }

    /// Run topic detection and memory extraction in parallel, then the
    /// conditional title generation
    ///
    /// Every failure in here is logged and swallowed; enrichment never
    /// disrupts the conversation.
    fn spawn_background(
        &self,
        session_id: String,
        user_text: String,
        reply: String,
        topic: Option<String>,
    ) -> JoinHandle<()> {
        let repo = self.repo.clone();
        let gateway = self.gateway.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let recent = repo
                .session(&session_id)
                .map(|s| s.recent_messages(TOPIC_WINDOW).to_vec())
                .unwrap_or_default();

            let topic_task = gateway.detect_topic(&recent, topic.as_deref());
            let memory_task = gateway.extract_memories(&user_text, &reply);
            let (topic_result, memory_result) = tokio::join!(topic_task, memory_task);

            match topic_result {
                Ok(detection) => {
                    if let Some(new_topic) = detection.effective_topic() {
                        match repo.set_topic(&session_id, new_topic).await {
                            Ok(()) => {
                                let _ = events.send(ChatEvent::TopicChanged {
                                    session_id: session_id.clone(),
                                    topic: new_topic.to_string(),
                                });
                            }
                            Err(e) => warn!("Failed to persist topic change: {}", e),
                        }
                    }
                }
                Err(e) => warn!("Topic detection failed: {}", e),
            }

            match memory_result {
                Ok(drafts) => {
                    let mut added = 0;
                    for draft in drafts {
                        match repo.save_memory(Memory::from_draft(draft)).await {
                            Ok(true) => added += 1,
                            Ok(false) => {}
                            Err(e) => warn!("Failed to save memory: {}", e),
                        }
                    }
                    if added > 0 {
                        let _ = events.send(ChatEvent::MemoriesUpdated { count: added });
                    }
                }
                Err(e) => warn!("Memory extraction failed: {}", e),
            }

            // Title generation, only while the placeholder remains
            let session = match repo.session(&session_id) {
                Some(s) => s,
                None => return,
            };
            if !session.has_default_title() || session.messages.len() < TITLE_MIN_MESSAGES {
                return;
            }

            let opening: Vec<Message> = session
                .messages
                .iter()
                .take(TITLE_SAMPLE)
                .cloned()
                .collect();
            match gateway.generate_title(&opening).await {
                Ok(title) => match repo.set_title_if_default(&session_id, &title).await {
                    Ok(true) => {
                        let _ = events.send(ChatEvent::TitleGenerated {
                            session_id: session_id.clone(),
                            title,
                        });
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Failed to persist title: {}", e),
                },
                Err(e) => warn!("Title generation failed: {}", e),
            }
        })
    }
}
