//! Object identities, listing pages and delete accounting

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stored object, or one version of it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
    bucket: String,
    key: String,
    version_id: Option<String>,
}

impl ObjectIdentity {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    pub fn versioned(
        bucket: impl Into<String>,
        key: impl Into<String>,
        version_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(v) => write!(f, "{}/{}@{}", self.bucket, self.key, v),
            None => write!(f, "{}/{}", self.bucket, self.key),
        }
    }
}

/// What a listing walks over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    /// Current objects only
    #[default]
    Objects,
    /// Every version and delete marker, most recent first per key
    Versions,
}

/// Position to resume a paginated listing from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    /// ListObjectsV2 continuation token
    Continuation(String),
    /// ListObjectVersions key/version markers
    Versions {
        key_marker: String,
        version_id_marker: Option<String>,
    },
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<ObjectIdentity>,
    pub next: Option<PageToken>,
}

impl ListPage {
    pub fn last(items: Vec<ObjectIdentity>) -> Self {
        Self { items, next: None }
    }

    pub fn with_next(items: Vec<ObjectIdentity>, next: PageToken) -> Self {
        Self {
            items,
            next: Some(next),
        }
    }
}

/// Result of a single delete attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub identity: ObjectIdentity,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DeleteOutcome {
    pub fn success(identity: ObjectIdentity) -> Self {
        Self {
            identity,
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(identity: ObjectIdentity, detail: impl Into<String>) -> Self {
        Self {
            identity,
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Accounting for a whole `delete_all` run.
///
/// `attempted` and `outcomes` always have the same length and order. When the
/// listing broke off early, `enumeration_error` holds the cause and the batch
/// never counts as fully successful.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchDeleteResult {
    attempted: Vec<ObjectIdentity>,
    outcomes: Vec<DeleteOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enumeration_error: Option<String>,
}

impl BatchDeleteResult {
    pub(crate) fn record(&mut self, outcome: DeleteOutcome) {
        self.attempted.push(outcome.identity.clone());
        self.outcomes.push(outcome);
    }

    pub(crate) fn set_enumeration_error(&mut self, detail: String) {
        self.enumeration_error = Some(detail);
    }

    pub fn attempted(&self) -> &[ObjectIdentity] {
        &self.attempted
    }

    pub fn outcomes(&self) -> &[DeleteOutcome] {
        &self.outcomes
    }

    pub fn enumeration_error(&self) -> Option<&str> {
        self.enumeration_error.as_deref()
    }

    /// True iff the listing completed and every delete succeeded (vacuously for
    /// an empty container)
    pub fn all_succeeded(&self) -> bool {
        self.enumeration_error.is_none() && self.outcomes.iter().all(|o| o.succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeleteOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }
}
