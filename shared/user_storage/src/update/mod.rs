//! Partial update builder with optimistic concurrency
//!
//! An update writes exactly the fields present on the user plus a freshly
//! stamped `lastModified`. In [`UpdateMode::Conditional`] the write only
//! goes through if the stored `lastModified` still equals the one the caller
//! read, so two writers starting from the same version cannot both succeed.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

use crate::codec::{self, timestamp_value, Item};
use crate::user::{User, UserAttribute, UserStorageError, UserStorageResult};

const EXPECTED_LAST_MODIFIED: &str = ":expectedLastModified";

/// Whether an update carries a version condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Rejected by the store when the row changed since it was read
    Conditional,
    /// Last writer wins
    Unconditional,
}

/// Version the stored row must still have for a conditional update to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCondition {
    /// Stored `lastModified` equals this timestamp
    Matches(DateTime<Utc>),
    /// Row exists and has never been stamped
    Unversioned,
}

/// A rendered partial update for one user row
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    id: Uuid,
    assignments: Vec<(String, AttributeValue)>,
    condition: Option<VersionCondition>,
    last_modified: DateTime<Utc>,
}

impl UpdateRequest {
    /// Id of the row being updated
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Primary key of the row being updated
    #[must_use]
    pub fn key(&self) -> Item {
        codec::key_for(self.id)
    }

    /// Attribute assignments, sorted by attribute name
    #[must_use]
    pub fn assignments(&self) -> &[(String, AttributeValue)] {
        &self.assignments
    }

    /// Version condition, `None` for unconditional updates
    #[must_use]
    pub const fn condition(&self) -> Option<&VersionCondition> {
        self.condition.as_ref()
    }

    /// `lastModified` written by this update
    #[must_use]
    pub const fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// `SET #a = :a, #b = :b` over every assignment
    #[must_use]
    pub fn update_expression(&self) -> String {
        let clauses: Vec<String> = self
            .assignments
            .iter()
            .map(|(name, _)| format!("#{name} = :{name}"))
            .collect();
        format!("SET {}", clauses.join(", "))
    }

    /// Condition expression guarding the write, if any
    #[must_use]
    pub fn condition_expression(&self) -> Option<String> {
        let last_modified = UserAttribute::LastModified;
        self.condition.map(|condition| match condition {
            VersionCondition::Matches(_) => {
                format!("#{last_modified} = {EXPECTED_LAST_MODIFIED}")
            }
            VersionCondition::Unversioned => format!(
                "attribute_exists(#{}) AND attribute_not_exists(#{last_modified})",
                UserAttribute::Id
            ),
        })
    }

    /// Placeholder to attribute name mapping for both expressions
    #[must_use]
    pub fn expression_attribute_names(&self) -> HashMap<String, String> {
        let mut names: HashMap<String, String> = self
            .assignments
            .iter()
            .map(|(name, _)| (format!("#{name}"), name.clone()))
            .collect();

        if matches!(self.condition, Some(VersionCondition::Unversioned)) {
            let id = UserAttribute::Id.to_string();
            names.insert(format!("#{id}"), id);
        }

        names
    }

    /// Placeholder to value mapping for both expressions
    #[must_use]
    pub fn expression_attribute_values(&self) -> Item {
        let mut values: Item = self
            .assignments
            .iter()
            .map(|(name, value)| (format!(":{name}"), value.clone()))
            .collect();

        if let Some(VersionCondition::Matches(expected)) = self.condition {
            values.insert(
                EXPECTED_LAST_MODIFIED.to_string(),
                timestamp_value(expected),
            );
        }

        values
    }
}

/// Computes the `lastModified` stamp for a write
///
/// `now` truncated to the stored microsecond precision, moved one
/// microsecond past `expected` if the clock has not passed it yet, so a
/// successful write always strictly increases the version.
#[must_use]
pub fn next_version(now: DateTime<Utc>, expected: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let stamp = now.trunc_subsecs(6);
    match expected {
        Some(expected) if stamp <= expected => expected.trunc_subsecs(6) + Duration::microseconds(1),
        _ => stamp,
    }
}

/// Builds the partial update for `user`
///
/// Only present fields are written. Any `last_modified` on the user is not
/// written back; in conditional mode it is the version the row must still
/// have.
///
/// # Errors
///
/// Returns `UserStorageError::Validation` if the user has no id, or
/// `UserStorageError::Codec` if a field cannot be encoded
pub fn build_update(
    user: &User,
    mode: UpdateMode,
    now: DateTime<Utc>,
) -> UserStorageResult<UpdateRequest> {
    let id = user
        .id
        .ok_or_else(|| UserStorageError::Validation("Id of user may not be null".to_string()))?;

    let mut item = codec::encode(user, false)?;
    let last_modified = next_version(now, user.last_modified);
    item.insert(
        UserAttribute::LastModified.to_string(),
        timestamp_value(last_modified),
    );

    let mut assignments: Vec<(String, AttributeValue)> = item.into_iter().collect();
    assignments.sort_by(|(a, _), (b, _)| a.cmp(b));

    let condition = match mode {
        UpdateMode::Conditional => Some(
            user.last_modified
                .map_or(VersionCondition::Unversioned, VersionCondition::Matches),
        ),
        UpdateMode::Unconditional => None,
    };

    Ok(UpdateRequest {
        id,
        assignments,
        condition,
        last_modified,
    })
}
