//! Shared utility functions.

use tokio::task::spawn_blocking;

use crate::{Error, Result};

/// Run a blocking closure on tokio's blocking pool.
///
/// A panic inside `f` surfaces as [`Error::TaskJoin`].
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Join names the way diagnostics print them: `a, b, c`.
pub fn comma_join<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
