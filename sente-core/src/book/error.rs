use std::io;

use thiserror::Error;

use crate::book::hash::BookHash;

#[derive(Debug, Error)]
pub enum BookError {
    #[error("book parameter {param} is {book} but caller wants {wanted}, and changing book params is not allowed")]
    ConfigMismatch {
        param: &'static str,
        book: f64,
        wanted: f64,
    },

    #[error("node {hash} walks to a position hashing to {computed}")]
    IntegrityFailure { hash: BookHash, computed: BookHash },

    #[error("recorded move {mv} at node {hash} is illegal under the current rules")]
    IllegalMoveInBook { hash: BookHash, mv: String },

    #[error("search obtained no new moves at node {hash} despite legal moves remaining")]
    NoNewMovesFound { hash: BookHash },

    #[error("cancelled")]
    Cancelled,

    #[error("book file version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("malformed book file: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
