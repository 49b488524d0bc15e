//! Business-rule qualification and send ordering.

use std::fmt;

use fpn_adapters::{FeedBatch, MalformedCandidate};
use fpn_core::{ActorRecord, CandidateRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Unverified,
    ExcludedCurrency(String),
    TooManySkills { count: usize, max: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unverified => write!(f, "owner has neither deposit nor verified payment"),
            Rejection::ExcludedCurrency(code) => write!(f, "currency {code} is excluded"),
            Rejection::TooManySkills { count, max } => {
                write!(f, "{count} required skills exceeds {max}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualificationFilter {
    pub max_skills: usize,
    pub excluded_currency: String,
}

impl QualificationFilter {
    pub fn is_qualified(&self, candidate: &CandidateRecord, actor: &ActorRecord) -> bool {
        self.rejection(candidate, actor).is_none()
    }

    /// First failed rule, if any.
    pub fn rejection(&self, candidate: &CandidateRecord, actor: &ActorRecord) -> Option<Rejection> {
        if !actor.is_verified() {
            return Some(Rejection::Unverified);
        }
        if candidate
            .currency
            .code
            .eq_ignore_ascii_case(&self.excluded_currency)
        {
            return Some(Rejection::ExcludedCurrency(candidate.currency.code.clone()));
        }
        if candidate.skill_count() > self.max_skills {
            return Some(Rejection::TooManySkills {
                count: candidate.skill_count(),
                max: self.max_skills,
            });
        }
        None
    }
}

/// A candidate that passed the filter, paired with its owner.
#[derive(Debug, Clone)]
pub struct Qualified {
    pub candidate: CandidateRecord,
    pub actor: ActorRecord,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Earliest submission first; ties keep feed order.
    pub qualified: Vec<Qualified>,
    pub rejected: Vec<(CandidateRecord, Rejection)>,
    pub malformed: Vec<MalformedCandidate>,
}

pub fn select_qualified(batch: FeedBatch, filter: &QualificationFilter) -> Selection {
    let FeedBatch {
        candidates,
        actors,
        mut malformed,
    } = batch;

    let mut qualified = Vec::new();
    let mut rejected = Vec::new();
    for candidate in candidates {
        let Some(actor) = actors.get(&candidate.owner_id) else {
            malformed.push(MalformedCandidate {
                candidate_id: Some(candidate.id),
                reason: format!("owner {} missing from user table", candidate.owner_id),
            });
            continue;
        };
        match filter.rejection(&candidate, actor) {
            None => qualified.push(Qualified {
                candidate,
                actor: actor.clone(),
            }),
            Some(reason) => rejected.push((candidate, reason)),
        }
    }

    order_for_sending(&mut qualified);

    Selection {
        qualified,
        rejected,
        malformed,
    }
}

pub fn order_for_sending(qualified: &mut [Qualified]) {
    qualified.sort_by_key(|q| q.candidate.submitted_at);
}
