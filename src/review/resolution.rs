//! User disposition tracking: at most one resolution per item identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::ItemKey;

/// Kind of disposition a user can record against an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    /// The user confirmed the item as settled.
    Resolved,
    /// The user wants the item kept visible.
    Flag,
    /// The user overrode the system verdict.
    Override,
}

impl std::str::FromStr for ResolutionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "resolved" => Ok(Self::Resolved),
            "flag" => Ok(Self::Flag),
            "override" => Ok(Self::Override),
            _ => anyhow::bail!(
                "Invalid resolution kind '{}'. Valid values: resolved, flag, override",
                s
            ),
        }
    }
}

/// One user disposition. The comment is required and non-empty; validation
/// happens at the call site before the tracker is invoked, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResolution {
    pub item_key: ItemKey,
    pub kind: ResolutionKind,
    pub comment: String,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: String,
}

impl UserResolution {
    pub fn new(
        item_key: ItemKey,
        kind: ResolutionKind,
        comment: impl Into<String>,
        resolved_by: impl Into<String>,
    ) -> Self {
        Self {
            item_key,
            kind,
            comment: comment.into(),
            resolved_at: Utc::now(),
            resolved_by: resolved_by.into(),
        }
    }
}

/// Insert or replace the resolution for its item key: any prior entry for
/// the key is removed, then the new one is appended.
pub fn upsert(list: &mut Vec<UserResolution>, resolution: UserResolution) {
    list.retain(|existing| existing.item_key != resolution.item_key);
    list.push(resolution);
}

/// Find the resolution for an item key.
///
/// Returns the most recently appended match. The invariants guarantee at
/// most one entry per key, but the scan runs back to front so a violated
/// invariant still yields the latest value rather than a stale one.
pub fn find<'a>(list: &'a [UserResolution], key: &ItemKey) -> Option<&'a UserResolution> {
    list.iter().rev().find(|r| &r.item_key == key)
}
