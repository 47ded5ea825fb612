use std::collections::BTreeSet;

use db::models::user::{self, Role};
use db::repositories::{AttendanceRepository, DirectoryQuery};
use serde::{Deserialize, Serialize};

use crate::error::{AttendanceError, AttendanceResult};
use crate::retry::{RetryPolicy, with_read_retry};

/// Who is expected to attend a session.
///
/// Resolved against the user directory exactly once, when the session is
/// created. Later profile changes never alter an existing session's list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserSelection {
    /// These ids, as given (blank ids dropped, duplicates collapsed).
    Explicit { user_ids: Vec<String> },
    /// Every profile in the directory, active or not.
    AllUsers,
    /// Profiles whose activity flag is set.
    #[default]
    ActiveUsers,
    /// Profiles matching every given criterion. Level bounds are inclusive.
    Filtered {
        role: Option<Role>,
        min_level: Option<i32>,
        max_level: Option<i32>,
        include_inactive: bool,
    },
}

/// What a selection would resolve to right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionPreview {
    /// Number of resolved ids, including explicit ids without a profile.
    pub total_users: usize,
    /// Profiles of the resolved ids, ordered by id.
    pub users: Vec<user::Model>,
}

impl UserSelection {
    fn directory_query(&self) -> DirectoryQuery {
        match self {
            UserSelection::Explicit { user_ids } => DirectoryQuery {
                ids: Some(user_ids.clone()),
                ..Default::default()
            },
            UserSelection::AllUsers => DirectoryQuery::default(),
            UserSelection::ActiveUsers => DirectoryQuery {
                active_only: true,
                ..Default::default()
            },
            UserSelection::Filtered {
                role,
                min_level,
                max_level,
                include_inactive,
            } => DirectoryQuery {
                ids: None,
                active_only: !include_inactive,
                role: *role,
                min_level: *min_level,
                max_level: *max_level,
            },
        }
    }

    async fn resolve_ids<R>(&self, repo: &R, read_retry: RetryPolicy) -> AttendanceResult<BTreeSet<String>>
    where
        R: AttendanceRepository,
    {
        if let UserSelection::Explicit { user_ids } = self {
            return Ok(user_ids
                .iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .collect());
        }

        let query = self.directory_query();
        let users = with_read_retry(read_retry, || repo.find_users(&query)).await?;
        Ok(users.into_iter().map(|u| u.id).collect())
    }

    /// Resolves the selection to a non-empty set of user ids.
    pub async fn resolve<R>(&self, repo: &R, read_retry: RetryPolicy) -> AttendanceResult<BTreeSet<String>>
    where
        R: AttendanceRepository,
    {
        let ids = self.resolve_ids(repo, read_retry).await?;
        if ids.is_empty() {
            return Err(AttendanceError::InvalidSelection(
                "no users found with the specified criteria".into(),
            ));
        }
        Ok(ids)
    }

    /// Resolves the selection without persisting anything. An empty result is
    /// reported, not rejected.
    pub async fn preview<R>(&self, repo: &R, read_retry: RetryPolicy) -> AttendanceResult<SelectionPreview>
    where
        R: AttendanceRepository,
    {
        let ids = self.resolve_ids(repo, read_retry).await?;
        if ids.is_empty() {
            return Ok(SelectionPreview {
                total_users: 0,
                users: Vec::new(),
            });
        }

        let query = DirectoryQuery {
            ids: Some(ids.iter().cloned().collect()),
            ..Default::default()
        };
        let users = with_read_retry(read_retry, || repo.find_users(&query)).await?;
        Ok(SelectionPreview {
            total_users: ids.len(),
            users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_active_users() {
        assert_eq!(UserSelection::default(), UserSelection::ActiveUsers);
    }
}
