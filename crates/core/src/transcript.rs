//! Append-only transcript of the discussion.

use crate::participant::{HUMAN_ID, HUMAN_NAME, Participant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a contribution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    Human,
    Agent,
}

/// A single message in the discussion. Immutable once recorded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Contribution {
    pub id: u64,
    pub speaker_id: String,
    pub display_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub kind: ContributionKind,
}

/// The ordered log of every contribution in a session.
///
/// Entries are stored in the order they were appended, which is the order in
/// which submits and generations resolved. Ids are assigned at append time, so
/// they are strictly increasing along the log.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Contribution>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a contribution and returns the new length of the log.
    pub fn append(
        &mut self,
        speaker_id: impl Into<String>,
        display_name: impl Into<String>,
        text: impl Into<String>,
        kind: ContributionKind,
    ) -> usize {
        self.next_id += 1;
        self.entries.push(Contribution {
            id: self.next_id,
            speaker_id: speaker_id.into(),
            display_name: display_name.into(),
            text: text.into(),
            created_at: Utc::now(),
            kind,
        });
        self.entries.len()
    }

    pub fn append_human(&mut self, text: impl Into<String>) -> usize {
        self.append(HUMAN_ID, HUMAN_NAME, text, ContributionKind::Human)
    }

    pub fn append_agent(&mut self, speaker: &Participant, text: impl Into<String>) -> usize {
        self.append(
            speaker.id.clone(),
            speaker.name.clone(),
            text,
            ContributionKind::Agent,
        )
    }

    /// The `n` most recent contributions, oldest first.
    pub fn latest(&self, n: usize) -> &[Contribution] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn all(&self) -> &[Contribution] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Contribution> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
