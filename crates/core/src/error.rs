use storage::models::SyncKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{service} is unreachable")]
    Unreachable { service: &'static str },
    #[error("could not record the start of a {kind} sync")]
    StartFailed {
        kind: SyncKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to {step}")]
    Step {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    pub(crate) fn step(step: &'static str) -> impl FnOnce(anyhow::Error) -> SyncError {
        move |source| SyncError::Step { step, source }
    }
}
