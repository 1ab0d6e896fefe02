//! Engine behavior against a scripted gateway

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use askly_chat::{ChatEngine, ChatEvent, EngineError, FALLBACK_REPLY};
use askly_core::{Memory, MemoryDraft, MemoryKind, Message, Role, TopicDetection, DEFAULT_TITLE};
use askly_llm::{LlmError, ModelGateway, TokenStream};
use askly_store::{JsonStorage, Repository, Storage};

#[derive(Clone, Default)]
struct MockGateway {
    fragments: Vec<String>,
    fail_open: bool,
    fail_mid_stream: bool,
    stream_delay: Option<Duration>,
    detection: Option<TopicDetection>,
    drafts: Vec<MemoryDraft>,
    title: Option<String>,
}

#[async_trait]
impl ModelGateway for MockGateway {
    async fn stream_chat(
        &self,
        _history: &[Message],
        _memories: &[Memory],
        _topic: Option<&str>,
    ) -> askly_llm::Result<TokenStream> {
        if self.fail_open {
            return Err(LlmError::Network("connection refused".to_string()));
        }

        let mut items: Vec<askly_llm::Result<String>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if self.fail_mid_stream {
            items.push(Err(LlmError::Stream("connection reset".to_string())));
        }

        let delay = self.stream_delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }

    async fn detect_topic(
        &self,
        _recent: &[Message],
        _current_topic: Option<&str>,
    ) -> askly_llm::Result<TopicDetection> {
        match &self.detection {
            Some(detection) => Ok(detection.clone()),
            None => Err(LlmError::Parse("no detection scripted".to_string())),
        }
    }

    async fn extract_memories(
        &self,
        _user_message: &str,
        _model_reply: &str,
    ) -> askly_llm::Result<Vec<MemoryDraft>> {
        Ok(self.drafts.clone())
    }

    async fn generate_title(&self, _opening: &[Message]) -> askly_llm::Result<String> {
        match &self.title {
            Some(title) => Ok(title.clone()),
            None => Err(LlmError::Network("no title scripted".to_string())),
        }
    }
}

struct Harness {
    _dir: TempDir,
    storage: Arc<JsonStorage>,
    repo: Arc<Repository>,
    engine: Arc<ChatEngine>,
    _events: UnboundedReceiver<ChatEvent>,
}

async fn harness(gateway: MockGateway) -> Harness {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
    let repo = Arc::new(Repository::load(storage.clone()).await.unwrap());
    let (engine, events) = ChatEngine::new(repo.clone(), Arc::new(gateway));
    Harness {
        _dir: dir,
        storage,
        repo,
        engine: Arc::new(engine),
        _events: events,
    }
}

fn replying(fragments: &[&str]) -> MockGateway {
    MockGateway {
        fragments: fragments.iter().map(|s| s.to_string()).collect(),
        ..MockGateway::default()
    }
}

#[tokio::test]
async fn fragments_converge_to_one_model_message() {
    let h = harness(replying(&["Hel", "lo ", "there"])).await;
    let session = h.repo.create_session().await.unwrap();

    let outcome = h.engine.send_message(&session.id, "hi").await.unwrap();
    assert!(!outcome.recovered);
    assert_eq!(outcome.content, "Hello there");
    if let Some(background) = outcome.background {
        background.await.unwrap();
    }

    let live = h.repo.session(&session.id).unwrap();
    // greeting + user + one streamed reply
    assert_eq!(live.messages.len(), 3);
    let reply = &live.messages[2];
    assert_eq!(reply.role, Role::Model);
    assert_eq!(reply.id, outcome.reply_id);
    assert_eq!(reply.content, "Hello there");
}

#[tokio::test]
async fn persisted_state_matches_live_view_after_send() {
    let h = harness(replying(&["ok"])).await;
    let session = h.repo.create_session().await.unwrap();

    let outcome = h.engine.send_message(&session.id, "hello").await.unwrap();
    if let Some(background) = outcome.background {
        background.await.unwrap();
    }

    let live = h.repo.session(&session.id).unwrap();
    let on_disk = h.storage.load_sessions().await.unwrap();
    let stored = &on_disk[&session.id];
    assert_eq!(stored.messages.len(), live.messages.len());
    for (a, b) in stored.messages.iter().zip(live.messages.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.content, b.content);
    }
}

#[tokio::test]
async fn pre_fragment_failure_appends_fallback() {
    let h = harness(MockGateway {
        fail_open: true,
        ..MockGateway::default()
    })
    .await;
    let session = h.repo.create_session().await.unwrap();

    let outcome = h.engine.send_message(&session.id, "hi").await.unwrap();
    assert!(outcome.recovered);
    assert!(outcome.background.is_none());

    let live = h.repo.session(&session.id).unwrap();
    // greeting + user + exactly one fallback reply
    assert_eq!(live.messages.len(), 3);
    assert_eq!(live.messages[1].role, Role::User);
    assert_eq!(live.messages[1].content, "hi");
    assert_eq!(live.messages[2].role, Role::Model);
    assert_eq!(live.messages[2].content, FALLBACK_REPLY);

    // Persisted too
    let on_disk = h.storage.load_sessions().await.unwrap();
    assert_eq!(on_disk[&session.id].messages.len(), 3);
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_and_falls_back() {
    let h = harness(MockGateway {
        fragments: vec!["par".to_string(), "tial".to_string()],
        fail_mid_stream: true,
        ..MockGateway::default()
    })
    .await;
    let session = h.repo.create_session().await.unwrap();

    let outcome = h.engine.send_message(&session.id, "hi").await.unwrap();
    assert!(outcome.recovered);

    let live = h.repo.session(&session.id).unwrap();
    assert_eq!(live.messages.len(), 4);
    assert_eq!(live.messages[2].content, "partial");
    assert_eq!(live.messages[3].content, FALLBACK_REPLY);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let h = harness(replying(&["ok"])).await;
    let session = h.repo.create_session().await.unwrap();

    let result = h.engine.send_message(&session.id, "   ").await;
    assert!(matches!(result, Err(EngineError::EmptyMessage)));
    assert_eq!(h.repo.session(&session.id).unwrap().messages.len(), 1);
}

#[tokio::test]
async fn unknown_session_is_rejected() {
    let h = harness(replying(&["ok"])).await;
    let result = h.engine.send_message("missing", "hi").await;
    assert!(matches!(result, Err(EngineError::SessionNotFound { .. })));
}

#[tokio::test]
async fn concurrent_send_on_same_session_is_busy() {
    let h = harness(MockGateway {
        fragments: vec!["slow".to_string()],
        stream_delay: Some(Duration::from_millis(200)),
        ..MockGateway::default()
    })
    .await;
    let session = h.repo.create_session().await.unwrap();

    let engine = h.engine.clone();
    let session_id = session.id.clone();
    let first = tokio::spawn(async move { engine.send_message(&session_id, "one").await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = h.engine.send_message(&session.id, "two").await;
    assert!(matches!(second, Err(EngineError::Busy { .. })));

    let outcome = first.await.unwrap().unwrap();
    if let Some(background) = outcome.background {
        background.await.unwrap();
    }

    // Busy flag cleared once the first send completes
    let third = h.engine.send_message(&session.id, "three").await;
    assert!(third.is_ok());
}

#[tokio::test]
async fn busy_flag_cleared_after_failure() {
    let h = harness(MockGateway {
        fail_open: true,
        ..MockGateway::default()
    })
    .await;
    let session = h.repo.create_session().await.unwrap();

    h.engine.send_message(&session.id, "hi").await.unwrap();
    let again = h.engine.send_message(&session.id, "hi again").await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn injected_extraction_yields_one_memory() {
    let drafts: Vec<MemoryDraft> = serde_json::from_str(
        r#"[{"type": "preference", "content": "Enjoys hiking", "importance": 0.8}]"#,
    )
    .unwrap();
    let h = harness(MockGateway {
        fragments: vec!["Nice!".to_string()],
        drafts,
        ..MockGateway::default()
    })
    .await;
    let session = h.repo.create_session().await.unwrap();

    let outcome = h.engine.send_message(&session.id, "I love hiking").await.unwrap();
    outcome.background.unwrap().await.unwrap();

    let memories = h.repo.memories();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].kind, MemoryKind::Preference);
    assert_eq!(memories[0].content, "Enjoys hiking");

    // Same extraction on the next turn dedups
    let outcome = h.engine.send_message(&session.id, "hiking again").await.unwrap();
    outcome.background.unwrap().await.unwrap();
    assert_eq!(h.repo.memories().len(), 1);
}

#[tokio::test]
async fn detected_topic_change_is_merged() {
    let h = harness(MockGateway {
        fragments: vec!["Sure".to_string()],
        detection: Some(TopicDetection {
            topic_changed: true,
            new_topic: Some("hiking trails".to_string()),
        }),
        ..MockGateway::default()
    })
    .await;
    let session = h.repo.create_session().await.unwrap();
    assert!(session.topic.is_none());

    let outcome = h.engine.send_message(&session.id, "about trails").await.unwrap();
    outcome.background.unwrap().await.unwrap();

    let live = h.repo.session(&session.id).unwrap();
    assert_eq!(live.topic.as_deref(), Some("hiking trails"));
}

#[tokio::test]
async fn title_generated_once_then_never_overwritten() {
    let h = harness(MockGateway {
        fragments: vec!["Reply".to_string()],
        title: Some("Hiking Plans".to_string()),
        ..MockGateway::default()
    })
    .await;
    let session = h.repo.create_session().await.unwrap();
    assert_eq!(session.title, DEFAULT_TITLE);

    let outcome = h.engine.send_message(&session.id, "let's hike").await.unwrap();
    outcome.background.unwrap().await.unwrap();
    assert_eq!(h.repo.session(&session.id).unwrap().title, "Hiking Plans");

    // A later send leaves the established title alone
    let outcome = h.engine.send_message(&session.id, "more plans").await.unwrap();
    outcome.background.unwrap().await.unwrap();
    assert_eq!(h.repo.session(&session.id).unwrap().title, "Hiking Plans");
}

#[tokio::test]
async fn analysis_failures_never_disrupt_the_chat() {
    // No detection or title scripted, so both background calls fail
    let h = harness(replying(&["fine"])).await;
    let session = h.repo.create_session().await.unwrap();

    let outcome = h.engine.send_message(&session.id, "hello").await.unwrap();
    assert!(!outcome.recovered);
    outcome.background.unwrap().await.unwrap();

    let live = h.repo.session(&session.id).unwrap();
    assert_eq!(live.messages.len(), 3);
    assert!(live.topic.is_none());
}
