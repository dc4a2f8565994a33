//! Row store seam between the synchronizer and the hosted database.

use crate::error::BackendError;
use crate::state::ToggleState;

/// Read and conditionally write the singleton row.
///
/// Implemented by [`crate::rest::RestClient`] and by in-memory doubles in tests.
#[async_trait::async_trait]
pub trait ToggleStore: Send + Sync {
    /// Read the current row.
    async fn fetch(&self) -> Result<ToggleState, BackendError>;

    /// Set the boolean on the singleton row and return the updated row.
    async fn write(&self, value: bool) -> Result<ToggleState, BackendError>;
}
