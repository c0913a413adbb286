use thiserror::Error;

use crate::storage::BackendError;

/// Errors surfaced synchronously by editing operations.
///
/// There is no permission variant: mutators with `canEdit = false`
/// return quietly and only leave a trace on the `security` log target.
#[derive(Debug, Error)]
pub enum EditorError {
    /// Room placement attempted with the draft already at the item limit.
    #[error("room is full: at most {limit} items can be placed")]
    CapacityExceeded { limit: usize },

    /// Move/rotate/remove referenced a placement that is not in the draft.
    #[error("placement not found: {0}")]
    PlacementNotFound(String),

    /// Remote save failed; the draft is kept for the next cycle.
    #[error("save failed: {0}")]
    SaveFailed(String),

    /// Wrapper around persistence collaborator errors (initial fetch, etc.).
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type EditorResult<T> = Result<T, EditorError>;
