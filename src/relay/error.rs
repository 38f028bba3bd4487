use std::io;
use std::path::PathBuf;

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The worker task has stopped and no longer accepts requests.
    #[error("audio relay worker is not running")]
    WorkerGone,

    /// The recording could not be written on release.
    #[error("failed to write recording to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
