use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hearth_core::errors::EngineError;
use hearth_core::conversation::PropertyCandidate;

/// Reply shapes the text generation service is known to produce. Plain text
/// is the common case; structured payloads carry the text under `content`
/// or `text`.
#[derive(Clone, Debug, PartialEq)]
pub enum GeneratedReply {
    Text(String),
    Structured(Value),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedReply, EngineError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyQuery {
    pub budget_ceiling: i64,
    pub preferences: BTreeMap<String, String>,
    pub limit: usize,
}

#[async_trait]
pub trait PropertyMatcher: Send + Sync {
    async fn find(&self, query: &PropertyQuery) -> Result<Vec<PropertyCandidate>, EngineError>;
}

#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn add_tags(&self, subject_id: &str, tags: &[String]) -> Result<(), EngineError>;
    async fn add_note(&self, subject_id: &str, note: &str) -> Result<(), EngineError>;
}

/// Notifications published on the event bus. Fire and observe: delivery is
/// best effort and never blocks the pipeline's own success.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    IntentAnalyzed { conversation_id: String, overall: f64, temperature: String },
    MatchUpdate { conversation_id: String, match_count: usize, criteria: String },
    FollowUpScheduled { conversation_id: String, reason: String },
    QualificationCompleted { conversation_id: String, financial_readiness_score: f64 },
    StatusUpdate { conversation_id: String, status: String },
    Escalation { conversation_id: String, reason: String, severity: String },
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<(), EngineError>;
}

/// Scripted generator for tests and the CLI simulator. Replies are served
/// in order; when the queue runs dry the default reply is returned.
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<Result<GeneratedReply, EngineError>>>,
    default_reply: String,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn with_default(reply: impl Into<String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default_reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, outcome: Result<GeneratedReply, EngineError>) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(outcome),
            Err(poisoned) => poisoned.into_inner().push_back(outcome),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::with_default("Happy to help you find the right home. What matters most to you?")
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedReply, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = match self.queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        queued.unwrap_or_else(|| Ok(GeneratedReply::Text(self.default_reply.clone())))
    }
}

/// In memory matcher backed by a fixed inventory. Filters on the budget
/// ceiling, honors the query limit, and can be primed to fail a number of
/// times for resilience tests.
#[derive(Default)]
pub struct InMemoryMatcher {
    inventory: Vec<PropertyCandidate>,
    fail_attempts: AtomicUsize,
    calls: AtomicUsize,
}

impl InMemoryMatcher {
    pub fn with_inventory(inventory: Vec<PropertyCandidate>) -> Self {
        Self { inventory, fail_attempts: AtomicUsize::new(0), calls: AtomicUsize::new(0) }
    }

    /// The next `attempts` calls fail with a retryable upstream error.
    pub fn fail_next(&self, attempts: usize) {
        self.fail_attempts.store(attempts, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PropertyMatcher for InMemoryMatcher {
    async fn find(&self, query: &PropertyQuery) -> Result<Vec<PropertyCandidate>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_attempts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_attempts.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::upstream("property_matcher", "search backend unavailable"));
        }

        Ok(self
            .inventory
            .iter()
            .filter(|candidate| candidate.price <= query.budget_ceiling)
            .take(query.limit)
            .cloned()
            .collect())
    }
}

/// Recording CRM used by tests and the simulator.
#[derive(Default)]
pub struct InMemoryCrm {
    tags: Mutex<BTreeMap<String, Vec<String>>>,
    notes: Mutex<BTreeMap<String, Vec<String>>>,
    failing: std::sync::atomic::AtomicBool,
}

impl InMemoryCrm {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn tags_for(&self, subject_id: &str) -> Vec<String> {
        match self.tags.lock() {
            Ok(tags) => tags.get(subject_id).cloned().unwrap_or_default(),
            Err(poisoned) => poisoned.into_inner().get(subject_id).cloned().unwrap_or_default(),
        }
    }

    pub fn notes_for(&self, subject_id: &str) -> Vec<String> {
        match self.notes.lock() {
            Ok(notes) => notes.get(subject_id).cloned().unwrap_or_default(),
            Err(poisoned) => poisoned.into_inner().get(subject_id).cloned().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl CrmClient for InMemoryCrm {
    async fn add_tags(&self, subject_id: &str, tags: &[String]) -> Result<(), EngineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::upstream("crm", "tag write rejected"));
        }
        match self.tags.lock() {
            Ok(mut map) => map.entry(subject_id.to_string()).or_default().extend_from_slice(tags),
            Err(poisoned) => poisoned
                .into_inner()
                .entry(subject_id.to_string())
                .or_default()
                .extend_from_slice(tags),
        }
        Ok(())
    }

    async fn add_note(&self, subject_id: &str, note: &str) -> Result<(), EngineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::upstream("crm", "note write rejected"));
        }
        match self.notes.lock() {
            Ok(mut map) => map.entry(subject_id.to_string()).or_default().push(note.to_string()),
            Err(poisoned) => poisoned
                .into_inner()
                .entry(subject_id.to_string())
                .or_default()
                .push(note.to_string()),
        }
        Ok(())
    }
}

/// Recording event bus. Best effort semantics are exercised by flipping the
/// failing switch.
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<Notification>>,
    failing: std::sync::atomic::AtomicBool,
}

impl RecordingBus {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Notification> {
        match self.published.lock() {
            Ok(published) => published.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, notification: Notification) -> Result<(), EngineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::upstream("event_bus", "publish rejected"));
        }
        match self.published.lock() {
            Ok(mut published) => published.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}
