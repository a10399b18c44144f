//! Decision log.
//!
//! An append-only ledger of decisions that affect more than one instance,
//! kept in `decisions.json`. Entries are never edited or removed; a decision
//! is reversed by logging a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    coordinator::Shared,
    identity::InstanceId,
    store::{Commit, DECISIONS_DOC},
    Error, Result,
};

const MAX_TITLE_LEN: usize = 200;

/// What a decision is about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DecisionCategory {
    Architecture,
    Convention,
    Dependency,
    Interface,
    Process,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DecisionStatus {
    Proposed,
    Accepted,
    Superseded,
    Rejected,
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// `DEC-YYYYMMDD-NNNN`
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub author: InstanceId,
    pub category: DecisionCategory,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope: String,
    pub status: DecisionStatus,
}

/// A decision to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDecision {
    pub category: DecisionCategory,
    pub title: String,
    pub description: String,
    pub scope: String,
    pub status: DecisionStatus,
}

/// On-disk shape of `decisions.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionsDocument {
    #[serde(default)]
    pub decisions: Vec<Decision>,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionLog<'a> {
    shared: &'a Shared,
}

impl<'a> DecisionLog<'a> {
    pub(crate) const fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    /// Append an accepted decision and return its id.
    pub fn log_decision(
        &self,
        author: &InstanceId,
        category: DecisionCategory,
        title: &str,
        description: &str,
        scope: &str,
    ) -> Result<String> {
        self.append(
            author,
            NewDecision {
                category,
                title: title.to_string(),
                description: description.to_string(),
                scope: scope.to_string(),
                status: DecisionStatus::Accepted,
            },
        )
        .map(|decision| decision.id)
    }

    /// Append a decision with an explicit status.
    ///
    /// The sequence number is the count of decisions already logged on the
    /// same UTC date, taken under the document lock, so ids are never reused.
    pub fn append(&self, author: &InstanceId, new: NewDecision) -> Result<Decision> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::validation(
                "Decision title cannot be empty",
                "title",
                None,
                "non-empty",
            ));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::validation(
                format!("Decision title exceeds {MAX_TITLE_LEN} characters"),
                "title",
                Some(title.to_string()),
                format!("max length {MAX_TITLE_LEN}"),
            ));
        }

        let now = self.shared.now();
        let prefix = format!("DEC-{}-", now.format("%Y%m%d"));

        let decision = self
            .shared
            .store
            .transact(DECISIONS_DOC, |doc: Option<DecisionsDocument>| {
                let mut doc = doc.unwrap_or_default();
                let sequence = doc
                    .decisions
                    .iter()
                    .filter(|d| d.id.starts_with(&prefix))
                    .count();
                let decision = Decision {
                    id: format!("{prefix}{sequence:04}"),
                    timestamp: now,
                    author: author.clone(),
                    category: new.category,
                    title: title.to_string(),
                    description: new.description.trim().to_string(),
                    scope: new.scope.trim().to_string(),
                    status: new.status,
                };
                doc.decisions.push(decision.clone());
                Ok((Commit::Replace(doc), decision))
            })?;

        tracing::info!(
            id = %decision.id,
            author = %decision.author,
            category = %decision.category,
            "Logged decision"
        );
        Ok(decision)
    }

    /// Up to `limit` decisions, newest first, optionally of one category.
    pub fn query_decisions(
        &self,
        category: Option<DecisionCategory>,
        limit: usize,
    ) -> Result<Vec<Decision>> {
        let doc = self
            .shared
            .store
            .read::<DecisionsDocument>(DECISIONS_DOC)?
            .unwrap_or_default();

        Ok(doc
            .decisions
            .into_iter()
            .rev()
            .filter(|d| category.map_or(true, |c| d.category == c))
            .take(limit)
            .collect())
    }
}
