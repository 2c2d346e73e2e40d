//! The mongodb crate doesn't provide error code constants, so this module
//! fills in the gaps and classifies the errors we care about.

use mongodb::error::{
    Error as DbError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
    UNKNOWN_TRANSACTION_COMMIT_RESULT,
};

use crate::error::Error;

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given result is a duplicate key write error.
pub fn is_duplicate_key_error<T>(result: Result<T, &DbError>) -> bool {
    if let Err(err) = result {
        if let ErrorKind::Write(WriteFailure::WriteError(ref e)) = *err.kind {
            return e.code == DUPLICATE_KEY;
        }
    }
    false
}

/// Classify an error raised inside a multi-document transaction.
///
/// Returns `None` if the transaction lost a write conflict and can safely be
/// re-executed from scratch. Any other failure is returned as an [`Error`];
/// a commit with an unknown outcome is never reported as retryable.
pub fn transaction_failure(err: DbError) -> Option<Error> {
    if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) {
        Some(Error::TransientStore(format!(
            "transaction commit result unknown: {err}"
        )))
    } else if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        None
    } else {
        Some(Error::Db(err))
    }
}
