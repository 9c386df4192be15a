//! Name-to-`wid` resolution shared by CLI commands that are not
//! necessarily operating on an already-monitored workflow (§2 supplemented
//! "Name resolution with ambiguity reporting").

use crate::errors::SyncError;
use crate::http::workflows::RemoteAdapter;
use crate::models::workflow::WorkflowSummary;

/// Resolve `identifier` against the remote enumeration. If `by_id`,
/// `identifier` is returned unchanged (assumed to already be a `wid`).
/// Otherwise performs a case-insensitive match — substring by default, or
/// exact when `exact` is set — erroring with [`SyncError::Ambiguous`] on
/// more than one match and [`SyncError::NotFound`] on zero.
pub async fn resolve(
    remote: &dyn RemoteAdapter,
    identifier: &str,
    by_id: bool,
    exact: bool,
) -> Result<String, SyncError> {
    if by_id {
        return Ok(identifier.to_string());
    }

    let needle = identifier.to_ascii_lowercase();
    let candidates: Vec<WorkflowSummary> = remote
        .enumerate()
        .await?
        .into_iter()
        .filter(|w| {
            let name = w.name.to_ascii_lowercase();
            if exact {
                name == needle
            } else {
                name.contains(&needle)
            }
        })
        .collect();

    match candidates.len() {
        0 => Err(SyncError::NotFound(identifier.to_string())),
        1 => Ok(candidates[0].id.clone()),
        _ => Err(SyncError::Ambiguous {
            query: identifier.to_string(),
            candidates: candidates.into_iter().map(|w| format!("{} ({})", w.name, w.id)).collect(),
        }),
    }
}

/// Same matching rule as [`resolve`], but returns every match instead of
/// requiring exactly one — used by the `find` command.
pub async fn find(
    remote: &dyn RemoteAdapter,
    query: &str,
    exact: bool,
) -> Result<Vec<WorkflowSummary>, SyncError> {
    let needle = query.to_ascii_lowercase();
    Ok(remote
        .enumerate()
        .await?
        .into_iter()
        .filter(|w| {
            let name = w.name.to_ascii_lowercase();
            if exact {
                name == needle
            } else {
                name.contains(&needle)
            }
        })
        .collect())
}
