//! Core domain model for FPN: feed candidates and the actors who posted them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod age;
pub mod flag;

pub use age::humanize_since;
pub use flag::flag_for_country;

pub const CRATE_NAME: &str = "fpn-core";

pub type CandidateId = i64;
pub type ActorId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub sign: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub minimum: f64,
    pub maximum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BidStats {
    pub bid_count: u32,
    pub bid_avg: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: i64,
    pub name: String,
}

/// One listing fetched from the feed. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub owner_id: ActorId,
    pub submitted_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub currency: Currency,
    pub budget: Budget,
    pub bid_stats: BidStats,
    /// Required skills, in feed order.
    pub skills: Vec<Skill>,
    pub seo_url: String,
}

impl CandidateRecord {
    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }

    pub fn skill_names(&self) -> impl Iterator<Item = &str> {
        self.skills.iter().map(|s| s.name.as_str())
    }

    pub fn public_url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.seo_url.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorStatus {
    pub deposit_made: bool,
    pub payment_verified: bool,
}

/// The account that owns a candidate, looked up from the feed's user side-table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub id: ActorId,
    pub username: String,
    pub registered_at: DateTime<Utc>,
    pub country: Option<String>,
    /// Employer reputation over the entire account history.
    pub reputation: f64,
    pub status: ActorStatus,
}

impl ActorRecord {
    pub fn is_verified(&self) -> bool {
        self.status.deposit_made || self.status.payment_verified
    }

    pub fn profile_url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.username)
    }
}
