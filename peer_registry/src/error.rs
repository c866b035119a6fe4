use crate::{record::Shape, session::SessionState};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Cannot {operation} a session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Invalid metadata")]
    InvalidMetaData(#[source] serde_json::Error),

    #[error("Window shape {0} is not finite")]
    InvalidShape(Shape),

    #[error("Metadata key '{0}' is not finite")]
    NonFiniteMetaData(&'static str),

    #[error("Store operation failed")]
    Store(#[source] anyhow::Error),

    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
