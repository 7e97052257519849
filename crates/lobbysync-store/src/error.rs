/// Errors that can occur in the store layer.
///
/// Split by retry behavior: [`is_transient`](Self::is_transient) errors
/// may succeed if the same operation is tried again later; the rest will
/// not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (network down, service degraded).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A transaction kept losing its compare-and-swap race.
    #[error("transaction on {key} aborted after {attempts} attempts")]
    Contention { key: String, attempts: u32 },

    /// The store's own rules rejected the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The store was shut down.
    #[error("store closed")]
    Closed,

    /// The backend hit an internal fault (e.g. a poisoned lock).
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns `true` if retrying the operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Contention { .. })
    }
}
