//! Scoped edit sessions.
//!
//! All writes happen between [`EditSession::begin`] and
//! [`EditSession::finish`]. `finish` takes the result of the work done
//! inside the session and commits on `Ok` or rolls back on `Err`, so every
//! exit path closes the session.

use tracing::{debug, error, warn};

use crate::core::traits::Store;
use crate::error::Result;

/// An open edit session on one store.
pub struct EditSession<'a> {
    store: &'a dyn Store,
    versioned: bool,
    finished: bool,
}

impl<'a> EditSession<'a> {
    /// Open an edit session, plus the nested edit operation when
    /// `versioned` is set.
    pub async fn begin(store: &'a dyn Store, versioned: bool) -> Result<EditSession<'a>> {
        store.begin_edit(versioned).await?;
        if versioned {
            if let Err(e) = store.begin_operation().await {
                if let Err(rb) = store.rollback_edit().await {
                    error!("Failed to close edit session on {}: {}", store.workspace(), rb);
                }
                return Err(e);
            }
        }
        debug!(
            "Started {}edit session on {}",
            if versioned { "versioned " } else { "" },
            store.workspace()
        );
        Ok(EditSession {
            store,
            versioned,
            finished: false,
        })
    }

    /// The store being edited.
    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    /// Commit if `result` is `Ok`, roll back otherwise, and hand `result` back.
    ///
    /// A failed commit rolls back and returns the commit error. A failed
    /// rollback is logged; the original error is returned.
    pub async fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        self.finished = true;
        match result {
            Ok(value) => match self.store.commit_edit().await {
                Ok(()) => {
                    debug!("Committed edits to {}", self.store.workspace());
                    Ok(value)
                }
                Err(e) => {
                    if self.store.is_editing() {
                        if let Err(rb) = self.store.rollback_edit().await {
                            error!("Rollback after failed commit on {} failed: {}", self.store.workspace(), rb);
                        }
                    }
                    Err(e)
                }
            },
            Err(e) => {
                warn!("Rolling back edits made to {}", self.store.workspace());
                if let Err(rb) = self.store.rollback_edit().await {
                    error!("Rollback on {} failed: {}", self.store.workspace(), rb);
                }
                Err(e)
            }
        }
    }
}

impl Drop for EditSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Edit session on {} dropped without commit or rollback",
                self.store.workspace()
            );
        }
    }
}
