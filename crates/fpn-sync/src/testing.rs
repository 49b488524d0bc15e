//! Builders and fakes shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fpn_adapters::{FeedBatch, FeedError, FeedSource, Messenger, SendError};
use fpn_core::{
    ActorId, ActorRecord, ActorStatus, BidStats, Budget, CandidateId, CandidateRecord, Currency,
    Skill,
};
use fpn_storage::{DedupeEntry, DedupeStore, MemoryDedupeStore, PersistenceError};
use uuid::Uuid;

use crate::pacer::Pacer;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

pub fn candidate(id: CandidateId, owner_id: ActorId, code: &str, skills: &[&str]) -> CandidateRecord {
    CandidateRecord {
        id,
        owner_id,
        submitted_at: at(1_700_000_000 + id),
        title: format!("Project {id}"),
        description: format!("Description {id}"),
        currency: Currency {
            code: code.to_string(),
            sign: if code == "USD" { "$" } else { "¤" }.to_string(),
        },
        budget: Budget {
            minimum: 100.0,
            maximum: 500.0,
        },
        bid_stats: BidStats {
            bid_count: 2,
            bid_avg: 300.0,
        },
        skills: skills
            .iter()
            .enumerate()
            .map(|(i, name)| Skill {
                id: i as i64,
                name: name.to_string(),
            })
            .collect(),
        seo_url: format!("misc/project-{id}"),
    }
}

pub fn actor(id: ActorId, deposit_made: bool, payment_verified: bool) -> ActorRecord {
    ActorRecord {
        id,
        username: format!("user{id}"),
        registered_at: at(1_500_000_000),
        country: Some("Germany".into()),
        reputation: 4.2,
        status: ActorStatus {
            deposit_made,
            payment_verified,
        },
    }
}

pub fn batch(candidates: Vec<CandidateRecord>, actors: Vec<ActorRecord>) -> FeedBatch {
    FeedBatch {
        candidates,
        actors: actors.into_iter().map(|a| (a.id, a)).collect::<HashMap<_, _>>(),
        malformed: vec![],
    }
}

/// Replays queued fetch results, then keeps returning the last batch.
#[derive(Default)]
pub struct ScriptedFeed {
    queue: Mutex<VecDeque<Result<FeedBatch, FeedError>>>,
    last: Mutex<Option<FeedBatch>>,
    pub fetches: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(results: Vec<Result<FeedBatch, FeedError>>) -> Self {
        Self {
            queue: Mutex::new(results.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch(&self, _run_id: Uuid) -> Result<FeedBatch, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(Ok(batch)) => {
                *self.last.lock().unwrap() = Some(batch.clone());
                Ok(batch)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last.lock().unwrap().clone().unwrap_or_default()),
        }
    }
}

/// Records every delivered message; fails sends whose text mentions a listed project URL slug.
#[derive(Default)]
pub struct RecordingMessenger {
    pub delivered: Mutex<Vec<String>>,
    pub attempts: AtomicUsize,
    failing_slugs: Mutex<HashSet<String>>,
}

impl RecordingMessenger {
    pub fn fail_for(&self, candidate_id: CandidateId) {
        self.failing_slugs
            .lock()
            .unwrap()
            .insert(format!("misc/project-{candidate_id}\""));
    }

    pub fn recover(&self) {
        self.failing_slugs.lock().unwrap().clear();
    }

    /// Project ids in delivery order, read back from the rendered links.
    pub fn delivered_ids(&self) -> Vec<CandidateId> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter_map(|text| {
                let start = text.find("misc/project-")? + "misc/project-".len();
                let rest = &text[start..];
                let end = rest.find('"')?;
                rest[..end].parse().ok()
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, _chat_id: &str, text: &str) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_slugs
            .lock()
            .unwrap()
            .iter()
            .any(|slug| text.contains(slug.as_str()));
        if failing {
            return Err(SendError::Rejected {
                status: 429,
                description: "Too Many Requests: retry later".into(),
            });
        }
        self.delivered.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Wraps the in-memory store, recording lookups and optionally failing writes.
#[derive(Default)]
pub struct SpyStore {
    pub inner: MemoryDedupeStore,
    pub lookups: Mutex<Vec<CandidateId>>,
    pub marks: Mutex<Vec<CandidateId>>,
    pub fail_marks: AtomicBool,
}

#[async_trait]
impl DedupeStore for SpyStore {
    async fn find_or_create(
        &self,
        candidate_id: CandidateId,
    ) -> Result<(DedupeEntry, bool), PersistenceError> {
        self.lookups.lock().unwrap().push(candidate_id);
        self.inner.find_or_create(candidate_id).await
    }

    async fn mark_notified(&self, candidate_id: CandidateId) -> Result<(), PersistenceError> {
        self.marks.lock().unwrap().push(candidate_id);
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(PersistenceError::Timeout(Duration::from_secs(10)));
        }
        self.inner.mark_notified(candidate_id).await
    }
}

/// Records requested pauses without waiting.
#[derive(Default)]
pub struct RecordingPacer {
    pub pauses: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, delay: Duration) {
        self.pauses.lock().unwrap().push(delay);
    }
}
