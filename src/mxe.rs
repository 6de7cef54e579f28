//! Black-box contract of the MPC execution environment (MXE).
//!
//! The cluster accepts an opaque computation offset bound to a circuit and a
//! list of arguments, asynchronously produces an output that a callback folds
//! into the election record, and exposes a public key for client-side key
//! exchange plus a health query. Everything else is the cluster's business.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::account::AccountId;

/// Opaque reference to a pending computation; chosen by the client at
/// queue time and used to poll for completion.
pub type ComputationOffset = u64;

/// The three circuits the protocol relies on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Circuit {
    /// Produce the encrypted all-zero tally for a new election.
    InitVoteStats,
    /// Fold one encrypted ballot into the running tally.
    Vote,
    /// Decrypt the final tally into plaintext counts.
    RevealResult,
}

impl Circuit {
    pub const ALL: [Circuit; 3] = [Circuit::InitVoteStats, Circuit::Vote, Circuit::RevealResult];

    pub fn name(&self) -> &'static str {
        match self {
            Circuit::InitVoteStats => "init_vote_stats",
            Circuit::Vote => "vote",
            Circuit::RevealResult => "reveal_result",
        }
    }

    /// The 4-byte definition offset for this circuit: the first four bytes
    /// of the SHA-256 of its name, little-endian.
    pub fn comp_def_offset(&self) -> u32 {
        let digest = Sha256::digest(self.name().as_bytes());
        u32::from_le_bytes(digest[..4].try_into().expect("digest is 32 bytes")) // Infallible.
    }
}

/// One argument to a queued computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// An x25519 public key for the shared-secret side of an encrypted input.
    ArcisPubkey([u8; 32]),
    /// A plaintext 128-bit value (nonces).
    PlaintextU128(u128),
    /// One 32-byte ciphertext slot.
    Encrypted([u8; 32]),
}

/// Completion state of a queued computation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ComputationStatus {
    Pending,
    Finalized,
    Aborted,
}

/// Faults raised by the cluster itself.
#[derive(Debug, Error)]
pub enum MxeError {
    #[error("MXE cluster is not healthy")]
    Unhealthy,
    #[error("MXE cluster public key is not available")]
    PublicKeyUnavailable,
    #[error("computation {0} was aborted by the cluster")]
    Aborted(ComputationOffset),
    #[error("unknown computation offset {0}")]
    UnknownComputation(ComputationOffset),
}

/// Client-side contract of the MXE cluster.
#[async_trait]
pub trait MxeCluster: Send + Sync {
    /// The cluster's x25519 public key, used to derive the ballot
    /// encryption key. May be transiently unavailable while the cluster
    /// bootstraps.
    async fn cluster_pubkey(&self) -> Result<[u8; 32], MxeError>;

    /// Liveness probe.
    async fn healthy(&self) -> bool;

    /// Queue a computation. `callback` names the account the computation
    /// output will be folded into on finalization.
    async fn queue(
        &self,
        circuit: Circuit,
        offset: ComputationOffset,
        args: Vec<Argument>,
        callback: AccountId,
    ) -> Result<(), MxeError>;

    /// Poll the completion state of a previously queued computation.
    async fn status(&self, offset: ComputationOffset) -> Result<ComputationStatus, MxeError>;
}

/// Static configuration for one circuit; created once at protocol
/// deployment and read-only afterward.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ComputationDefinition {
    /// Circuit definition offset (see [`Circuit::comp_def_offset`]).
    pub offset: u32,
    /// Circuit name.
    pub circuit: String,
    /// The authority that created the definition.
    pub authority: AccountId,
}
