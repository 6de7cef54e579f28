use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::account::AccountId;

/// Compute the nullifier digest for a (voter, election) pair:
/// SHA-256 over the voter hash followed by the election identifier.
///
/// Casting twice from the same voter hash for the same election derives the
/// identical digest, so the second nullifier account collides with the first
/// and the ledger's create-if-absent semantics reject it. This collision is
/// the double-vote prevention mechanism.
pub fn compute_nullifier(voter_hash: &AccountId, election: &AccountId) -> AccountId {
    let mut hasher = Sha256::new();
    hasher.update(voter_hash.as_ref());
    hasher.update(election.as_ref());
    AccountId(hasher.finalize().into())
}

/// Nullifier record; one per (election, nullifier hash). Created exactly once
/// per successful vote, never deleted, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nullifier {
    /// The election this nullifier belongs to.
    pub election: AccountId,
    /// The nullifier digest.
    pub nullifier_hash: AccountId,
    /// Bump used when deriving the nullifier account.
    pub bump: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullifier_is_deterministic() {
        let voter = AccountId::example(1);
        let election = AccountId::example(2);
        assert_eq!(
            compute_nullifier(&voter, &election),
            compute_nullifier(&voter, &election)
        );
    }

    #[test]
    fn nullifier_differs_across_elections() {
        let voter = AccountId::example(1);
        assert_ne!(
            compute_nullifier(&voter, &AccountId::example(2)),
            compute_nullifier(&voter, &AccountId::example(3))
        );
    }

    #[test]
    fn nullifier_differs_across_voters() {
        let election = AccountId::example(2);
        assert_ne!(
            compute_nullifier(&AccountId::example(1), &election),
            compute_nullifier(&AccountId::example(4), &election)
        );
    }
}
