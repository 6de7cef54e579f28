use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::account::AccountId;

/// Compute a receipt identifier from a random seed and the election
/// identifier: SHA-256 over the seed followed by the election bytes.
pub fn compute_receipt(seed: &[u8; 32], election: &AccountId) -> AccountId {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(election.as_ref());
    AccountId(hasher.finalize().into())
}

/// Receipt record persisted at cast time; verification is a read-only
/// existence check keyed by the receipt digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    /// The election the receipt belongs to.
    pub election: AccountId,
    /// The receipt digest.
    pub receipt_id: AccountId,
    /// Bump used when deriving the record account.
    pub bump: u8,
}

/// What the voter takes away from a successful cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    /// The election voted in.
    pub election: AccountId,
    /// Digest the voter can later present for verification.
    pub receipt_id: AccountId,
    /// The nullifier consumed by this vote.
    pub nullifier_hash: AccountId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_is_deterministic() {
        let election = AccountId::example(2);
        assert_eq!(
            compute_receipt(&[9; 32], &election),
            compute_receipt(&[9; 32], &election)
        );
    }

    #[test]
    fn receipt_differs_by_seed_and_election() {
        let election = AccountId::example(2);
        let base = compute_receipt(&[9; 32], &election);
        assert_ne!(base, compute_receipt(&[8; 32], &election));
        assert_ne!(base, compute_receipt(&[9; 32], &AccountId::example(3)));
    }
}
