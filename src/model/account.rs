use std::fmt::{self, Debug, Display, Formatter};

use curve25519_dalek::edwards::CompressedEdwardsY;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Seed label for election accounts.
pub const ELECTION_SEED: &[u8] = b"election";
/// Seed label for the per-election signing authority.
pub const SIGNER_SEED: &[u8] = b"sign_pda";
/// Seed label for the global voter registry; one proof account per voter hash.
pub const VOTER_REGISTRY_SEED: &[u8] = b"voters_registry";
/// Seed label for per-election nullifier accounts.
pub const NULLIFIER_SEED: &[u8] = b"nullifier";
/// Seed label for per-election receipt records.
pub const RECEIPT_SEED: &[u8] = b"receipt";
/// Seed label for computation definition accounts.
pub const COMP_DEF_SEED: &[u8] = b"comp_def";

/// Domain separator appended to every derivation, ensuring derived
/// identifiers can never collide with ordinary key material.
const DERIVE_MARKER: &[u8] = b"ProgramDerivedAddress";

/// A 32-byte account identifier.
///
/// Used both for genuine public keys (creator and voter identities) and for
/// derived addresses; the two are distinguished only by how they were
/// obtained.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}

impl Debug for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

/// The identifier of the deployed voting program; every derivation is
/// namespaced under it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramId(pub [u8; 32]);

impl AsRef<[u8]> for ProgramId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Derive a deterministic account identifier from the given seeds.
///
/// Starting from the highest bump, hash the seeds, the bump, the program id
/// and the domain marker; the first digest that is not a valid curve point is
/// the identifier. Identical inputs always yield the identical
/// (identifier, bump) pair.
pub fn derive_address(program: &ProgramId, seeds: &[&[u8]]) -> (AccountId, u8) {
    try_derive_address(program, seeds).expect("derivation space exhausted") // Effectively unreachable.
}

fn try_derive_address(program: &ProgramId, seeds: &[&[u8]]) -> Option<(AccountId, u8)> {
    for bump in (0..=u8::MAX).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program.as_ref());
        hasher.update(DERIVE_MARKER);
        let digest: [u8; 32] = hasher.finalize().into();

        // A digest that decompresses to a curve point could be forged as an
        // ordinary public key; skip it and try the next bump.
        if CompressedEdwardsY(digest).decompress().is_none() {
            return Some((AccountId(digest), bump));
        }
    }
    None
}

/// Election account: `["election", creator, election_id LE64]`.
pub fn election_account(program: &ProgramId, creator: &AccountId, election_id: u64) -> (AccountId, u8) {
    derive_address(
        program,
        &[ELECTION_SEED, creator.as_ref(), &election_id.to_le_bytes()],
    )
}

/// Per-election signing authority: `["sign_pda", election]`.
pub fn signer_account(program: &ProgramId, election: &AccountId) -> (AccountId, u8) {
    derive_address(program, &[SIGNER_SEED, election.as_ref()])
}

/// Voter proof account, keyed globally by voter hash:
/// `["voters_registry", voter_hash]`.
pub fn voter_proof_account(program: &ProgramId, voter_hash: &AccountId) -> (AccountId, u8) {
    derive_address(program, &[VOTER_REGISTRY_SEED, voter_hash.as_ref()])
}

/// Nullifier account: `["nullifier", election, nullifier_hash]`.
pub fn nullifier_account(
    program: &ProgramId,
    election: &AccountId,
    nullifier_hash: &AccountId,
) -> (AccountId, u8) {
    derive_address(
        program,
        &[NULLIFIER_SEED, election.as_ref(), nullifier_hash.as_ref()],
    )
}

/// Receipt record account: `["receipt", election, receipt_id]`.
pub fn receipt_account(
    program: &ProgramId,
    election: &AccountId,
    receipt_id: &AccountId,
) -> (AccountId, u8) {
    derive_address(
        program,
        &[RECEIPT_SEED, election.as_ref(), receipt_id.as_ref()],
    )
}

/// Computation definition account: `["comp_def", offset LE32]`.
pub fn comp_def_account(program: &ProgramId, offset: u32) -> (AccountId, u8) {
    derive_address(program, &[COMP_DEF_SEED, &offset.to_le_bytes()])
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl AccountId {
        pub fn example(fill: u8) -> Self {
            Self([fill; 32])
        }
    }

    impl ProgramId {
        pub fn example() -> Self {
            Self([7; 32])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let program = ProgramId::example();
        let creator = AccountId::example(1);

        let (first, first_bump) = election_account(&program, &creator, 123);
        let (second, second_bump) = election_account(&program, &creator, 123);

        assert_eq!(first, second);
        assert_eq!(first_bump, second_bump);
    }

    #[test]
    fn distinct_entities_get_distinct_identifiers() {
        let program = ProgramId::example();
        let creator = AccountId::example(1);

        let (by_id_a, _) = election_account(&program, &creator, 1);
        let (by_id_b, _) = election_account(&program, &creator, 2);
        assert_ne!(by_id_a, by_id_b);

        let (by_creator, _) = election_account(&program, &AccountId::example(2), 1);
        assert_ne!(by_id_a, by_creator);

        let (voter, _) = voter_proof_account(&program, &AccountId::example(3));
        let (nullifier, _) = nullifier_account(&program, &by_id_a, &AccountId::example(3));
        assert_ne!(voter, nullifier);

        let (signer, _) = signer_account(&program, &by_id_a);
        assert_ne!(signer, by_id_a);
        assert_ne!(signer, nullifier);
    }

    #[test]
    fn seed_order_matters() {
        let program = ProgramId::example();
        let a = AccountId::example(4);
        let b = AccountId::example(5);

        let (fwd, _) = derive_address(&program, &[a.as_ref(), b.as_ref()]);
        let (rev, _) = derive_address(&program, &[b.as_ref(), a.as_ref()]);
        assert_ne!(fwd, rev);
    }

    #[test]
    fn derived_identifiers_are_off_curve() {
        let program = ProgramId::example();
        let (id, _) = voter_proof_account(&program, &AccountId::example(9));
        assert!(CompressedEdwardsY(id.0).decompress().is_none());
    }
}
