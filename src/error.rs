use thiserror::Error;

use crate::ledger::LedgerError;
use crate::mxe::{ComputationOffset, MxeError};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the protocol client.
///
/// The first four variants form the protocol error taxonomy; the transparent
/// wrappers carry faults from the two external collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input or an unmet protocol precondition, rejected before
    /// any ledger or MXE call is made.
    #[error("Precondition violated: {0}")]
    Precondition(String),
    /// The ledger refused an account creation because the account already
    /// exists (double vote, double registration). Never retried.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A queued MPC computation did not finalize within the retry budget.
    /// The caller may safely retry the whole step.
    #[error("Computation {offset} did not finalize after {attempts} attempts")]
    FinalizationTimeout {
        offset: ComputationOffset,
        attempts: u32,
    },
    /// The caller lacks the required authority relation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// A referenced account does not exist on the ledger.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Mxe(#[from] MxeError),
}

impl Error {
    /// True iff retrying the same step may succeed without any other
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FinalizationTimeout { .. } | Error::Mxe(MxeError::PublicKeyUnavailable)
        )
    }
}
