//! Active-project feed: query construction, wire envelope parsing, validation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fpn_core::{
    ActorId, ActorRecord, ActorStatus, BidStats, Budget, CandidateId, CandidateRecord, Currency,
    Skill,
};
use fpn_storage::{FetchError, HttpClientConfig, HttpFetcher};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_FEED_ENDPOINT: &str = "https://www.freelancer.com/api/projects/0.1/projects/active/";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transient fetch error: {0}")]
    TransientFetch(#[from] FetchError),
    #[error("malformed feed response: {0}")]
    MalformedResponse(String),
    #[error("invalid feed endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// A project the feed returned that could not be turned into a usable candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCandidate {
    pub candidate_id: Option<CandidateId>,
    pub reason: String,
}

/// One cycle's worth of feed data, in feed order.
#[derive(Debug, Clone, Default)]
pub struct FeedBatch {
    pub candidates: Vec<CandidateRecord>,
    pub actors: HashMap<ActorId, ActorRecord>,
    pub malformed: Vec<MalformedCandidate>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, run_id: Uuid) -> Result<FeedBatch, FeedError>;
}

/// Server-side filters for the active-projects query. Fixed per deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedQuery {
    pub endpoint: String,
    pub skill_ids: Vec<u32>,
    pub languages: Vec<String>,
    pub limit: u32,
    pub min_avg_price: u32,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_FEED_ENDPOINT.to_string(),
            skill_ids: Vec::new(),
            languages: vec!["en".to_string(), "hi".to_string()],
            limit: 300,
            min_avg_price: 500,
        }
    }
}

impl FeedQuery {
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("compact", "true")
                .append_pair("forceShowLocationDetails", "false")
                .append_pair("full_description", "true")
                .append_pair("job_details", "true");
            for skill_id in &self.skill_ids {
                pairs.append_pair("jobs[]", &skill_id.to_string());
            }
            pairs.append_pair("keywords", "");
            for language in &self.languages {
                pairs.append_pair("languages[]", language);
            }
            pairs
                .append_pair("limit", &self.limit.to_string())
                .append_pair("min_avg_price", &self.min_avg_price.to_string())
                .append_pair("offset", "0")
                .append_pair("project_types[]", "fixed")
                .append_pair("query", "")
                .append_pair("sort_field", "submitdate")
                .append_pair("upgrade_details", "true")
                .append_pair("user_details", "true")
                .append_pair("user_employer_reputation", "true")
                .append_pair("user_status", "true");
        }
        Ok(url)
    }
}

#[derive(Debug)]
pub struct FeedClient {
    http: HttpFetcher,
    url: Url,
}

impl FeedClient {
    pub fn new(query: &FeedQuery, http: HttpClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(http)?,
            url: query.to_url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch(&self, run_id: Uuid) -> Result<FeedBatch, FeedError> {
        let response = self.http.fetch_bytes(run_id, self.url.as_str()).await?;
        debug!(bytes = response.body.len(), "feed response received");
        parse_feed(&response.body)
    }
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    result: Option<WireResult>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    projects: Option<Vec<JsonValue>>,
    #[serde(default)]
    users: HashMap<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
struct WireProject {
    id: i64,
    owner_id: i64,
    title: String,
    description: String,
    currency: WireCurrency,
    budget: WireBudget,
    bid_stats: WireBidStats,
    jobs: Vec<WireJob>,
    seo_url: String,
    submitdate: i64,
}

#[derive(Debug, Deserialize)]
struct WireCurrency {
    code: String,
    sign: String,
}

#[derive(Debug, Deserialize)]
struct WireBudget {
    minimum: f64,
    maximum: f64,
}

#[derive(Debug, Deserialize)]
struct WireBidStats {
    bid_count: u32,
    // Absent or null until the first bid lands.
    #[serde(default)]
    bid_avg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireJob {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    username: String,
    registration_date: i64,
    #[serde(default)]
    location: Option<WireLocation>,
    employer_reputation: WireReputation,
    status: WireStatus,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    #[serde(default)]
    country: Option<WireCountry>,
}

#[derive(Debug, Deserialize)]
struct WireCountry {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReputation {
    entire_history: WireHistory,
}

#[derive(Debug, Deserialize)]
struct WireHistory {
    overall: f64,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    deposit_made: Option<bool>,
    #[serde(default)]
    payment_verified: Option<bool>,
}

/// Parse a raw feed body. Envelope problems fail the whole batch; a bad project only drops itself.
pub fn parse_feed(body: &[u8]) -> Result<FeedBatch, FeedError> {
    let envelope: WireEnvelope = serde_json::from_slice(body)
        .map_err(|e| FeedError::MalformedResponse(format!("invalid json envelope: {e}")))?;
    let result = envelope
        .result
        .ok_or_else(|| FeedError::MalformedResponse("missing `result`".to_string()))?;
    let projects = result
        .projects
        .ok_or_else(|| FeedError::MalformedResponse("missing `result.projects`".to_string()))?;

    let mut actors = HashMap::with_capacity(result.users.len());
    for (key, raw) in result.users {
        match serde_json::from_value::<WireUser>(raw).map_err(|e| e.to_string()).and_then(actor_from_wire) {
            Ok(actor) => {
                actors.insert(actor.id, actor);
            }
            Err(reason) => warn!(user_key = %key, %reason, "dropping malformed user record"),
        }
    }

    let mut candidates = Vec::with_capacity(projects.len());
    let mut malformed = Vec::new();
    for raw in projects {
        let candidate_id = raw.get("id").and_then(JsonValue::as_i64);
        match serde_json::from_value::<WireProject>(raw)
            .map_err(|e| e.to_string())
            .and_then(candidate_from_wire)
        {
            Ok(candidate) => candidates.push(candidate),
            Err(reason) => malformed.push(MalformedCandidate {
                candidate_id,
                reason,
            }),
        }
    }

    Ok(FeedBatch {
        candidates,
        actors,
        malformed,
    })
}

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| format!("`{field}` out of range: {secs}"))
}

fn candidate_from_wire(p: WireProject) -> Result<CandidateRecord, String> {
    Ok(CandidateRecord {
        id: p.id,
        owner_id: p.owner_id,
        submitted_at: timestamp(p.submitdate, "submitdate")?,
        title: p.title,
        description: p.description,
        currency: Currency {
            code: p.currency.code,
            sign: p.currency.sign,
        },
        budget: Budget {
            minimum: p.budget.minimum,
            maximum: p.budget.maximum,
        },
        bid_stats: BidStats {
            bid_count: p.bid_stats.bid_count,
            bid_avg: p.bid_stats.bid_avg.unwrap_or(0.0),
        },
        skills: p
            .jobs
            .into_iter()
            .map(|j| Skill {
                id: j.id,
                name: j.name,
            })
            .collect(),
        seo_url: p.seo_url,
    })
}

fn actor_from_wire(u: WireUser) -> Result<ActorRecord, String> {
    Ok(ActorRecord {
        id: u.id,
        username: u.username,
        registered_at: timestamp(u.registration_date, "registration_date")?,
        country: u.location.and_then(|l| l.country).and_then(|c| c.name),
        reputation: u.employer_reputation.entire_history.overall,
        status: ActorStatus {
            deposit_made: u.status.deposit_made.unwrap_or(false),
            payment_verified: u.status.payment_verified.unwrap_or(false),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../fixtures/active_projects.json");

    #[test]
    fn query_url_carries_every_server_side_filter() {
        let query = FeedQuery {
            skill_ids: vec![3, 9],
            ..FeedQuery::default()
        };
        let url = query.to_url().expect("url");
        let text = url.as_str();

        assert!(text.starts_with(DEFAULT_FEED_ENDPOINT));
        assert!(text.contains("jobs%5B%5D=3&jobs%5B%5D=9"));
        assert!(text.contains("languages%5B%5D=en&languages%5B%5D=hi"));
        assert!(text.contains("limit=300"));
        assert!(text.contains("min_avg_price=500"));
        assert!(text.contains("project_types%5B%5D=fixed"));
        assert!(text.contains("sort_field=submitdate"));
        assert!(text.contains("full_description=true"));
        assert!(text.contains("user_employer_reputation=true"));
        assert!(text.contains("user_status=true"));
    }

    #[test]
    fn fixture_parses_into_typed_records() {
        let batch = parse_feed(FIXTURE.as_bytes()).expect("parse");

        assert_eq!(
            batch.candidates.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![101, 102, 103]
        );
        let first = &batch.candidates[0];
        assert_eq!(first.currency.code, "USD");
        assert_eq!(first.skill_names().collect::<Vec<_>>(), vec!["Python", "Web Scraping"]);
        assert_eq!(first.submitted_at.timestamp(), 1_714_550_400);
        assert_eq!(first.bid_stats.bid_avg, 612.5);
        // bid_avg is null until a bid arrives
        assert_eq!(batch.candidates[2].bid_stats.bid_avg, 0.0);

        let owner = &batch.actors[&first.owner_id];
        assert_eq!(owner.username, "acme_labs");
        assert_eq!(owner.country.as_deref(), Some("United States"));
        assert!(owner.is_verified());
        assert_eq!(batch.actors[&502].country, None);
    }

    #[test]
    fn broken_projects_are_reported_not_fatal() {
        let batch = parse_feed(FIXTURE.as_bytes()).expect("parse");
        assert_eq!(batch.malformed.len(), 1);
        assert_eq!(batch.malformed[0].candidate_id, Some(104));
        assert!(batch.malformed[0].reason.contains("currency"));

        // Same record as 101, each copy missing one field a listing must carry.
        let mut body: JsonValue = serde_json::from_str(FIXTURE).expect("fixture json");
        let projects = body["result"]["projects"].as_array_mut().expect("projects");
        let template = projects[0].clone();
        for (id, field) in [(105, "jobs"), (106, "description")] {
            let mut project = template.clone();
            project["id"] = id.into();
            project.as_object_mut().expect("object").remove(field);
            projects.push(project);
        }
        let mut null_description = template;
        null_description["id"] = 107.into();
        null_description["description"] = JsonValue::Null;
        projects.push(null_description);

        let batch = parse_feed(body.to_string().as_bytes()).expect("parse");
        let ids: Vec<_> = batch.candidates.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![101, 102, 103]);
        let broken: Vec<_> = batch.malformed.iter().map(|m| m.candidate_id).collect();
        assert_eq!(broken, vec![Some(104), Some(105), Some(106), Some(107)]);
        assert!(batch.malformed[1].reason.contains("jobs"));
        assert!(batch.malformed[2].reason.contains("description"));
    }

    #[test]
    fn missing_envelope_fails_the_batch() {
        let err = parse_feed(br#"{"status":"error"}"#).expect_err("no result");
        assert!(matches!(err, FeedError::MalformedResponse(_)));

        let err = parse_feed(br#"{"result":{"users":{}}}"#).expect_err("no projects");
        assert!(matches!(err, FeedError::MalformedResponse(_)));

        let err = parse_feed(b"<html>").expect_err("not json");
        assert!(matches!(err, FeedError::MalformedResponse(_)));
    }

    #[test]
    fn empty_project_list_is_a_valid_batch() {
        let batch = parse_feed(br#"{"result":{"projects":[],"users":{}}}"#).expect("parse");
        assert!(batch.candidates.is_empty());
        assert!(batch.actors.is_empty());
    }
}
