//! Abstract contract of the ledger platform.
//!
//! The protocol core never touches ledger state except through this
//! interface. Atomicity of "this account does not yet exist, therefore the
//! operation is accepted" is delegated entirely to [`Ledger::create_if_absent`];
//! it is the sole concurrency-correctness mechanism in the protocol.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::account::AccountId;
use crate::model::election::Election;
use crate::model::nullifier::Nullifier;
use crate::model::receipt::ReceiptRecord;
use crate::model::voter::VoterProof;
use crate::mxe::ComputationDefinition;

/// Typed payload of a ledger account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountData {
    Election(Election),
    VoterProof(VoterProof),
    Nullifier(Nullifier),
    Receipt(ReceiptRecord),
    ComputationDefinition(ComputationDefinition),
}

impl AccountData {
    pub fn as_election(&self) -> Option<&Election> {
        match self {
            AccountData::Election(election) => Some(election),
            _ => None,
        }
    }

    pub fn as_voter_proof(&self) -> Option<&VoterProof> {
        match self {
            AccountData::VoterProof(proof) => Some(proof),
            _ => None,
        }
    }
}

/// Faults raised by the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Create-if-absent refused: the account already exists. Exactly one of
    /// any set of racing creations for the same identifier succeeds; all
    /// others observe this error.
    #[error("account {0} already exists")]
    AlreadyExists(AccountId),
    /// Any other backend fault (connectivity, serialization, ...).
    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// Injected store interface over the shared, externally-consistent ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Atomically create the account iff no account with this identifier
    /// exists yet; fail with [`LedgerError::AlreadyExists`] otherwise.
    async fn create_if_absent(&self, id: AccountId, data: AccountData) -> Result<(), LedgerError>;

    /// Fetch an account by identifier. `None` means the account does not
    /// exist; existence checks are exactly this call.
    async fn fetch(&self, id: AccountId) -> Result<Option<AccountData>, LedgerError>;
}
