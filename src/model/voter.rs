use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::account::AccountId;

pub type HmacSha256 = Hmac<Sha256>;

/// Compute a voter hash from raw identity material under a deployment-global
/// salt. The hash is public-key-shaped so it can be used directly as a
/// derivation seed; the identity material itself never leaves the client.
pub fn voter_hash(identity: &[u8], salt: &[u8]) -> AccountId {
    let mut mac = HmacSha256::new_from_slice(salt).expect("HMAC accepts any key length"); // Infallible.
    mac.update(identity);
    let digest: [u8; 32] = mac.finalize().into_bytes().into();
    AccountId(digest)
}

/// Registration proof, keyed globally by voter hash. The existence of the
/// record is the proof; it is created once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterProof {
    /// The registered voter hash (also encoded in the account address).
    pub voter_hash: AccountId,
    /// Bump used when deriving the proof account.
    pub bump: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voter_hash_is_deterministic() {
        let first = voter_hash(b"identity material", b"salt");
        let second = voter_hash(b"identity material", b"salt");
        assert_eq!(first, second);
    }

    #[test]
    fn voter_hash_separates_identities_and_salts() {
        let base = voter_hash(b"identity material", b"salt");
        assert_ne!(base, voter_hash(b"other material", b"salt"));
        assert_ne!(base, voter_hash(b"identity material", b"other salt"));
    }
}
