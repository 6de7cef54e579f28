use aes::Aes256;
use ctr::cipher::generic_array::GenericArray;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand::{CryptoRng, Rng, RngCore};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{Error, Result};

use super::election::{CIPHERTEXT_LEN, MAX_CANDIDATES};

/// Keystream used for all fixed-width ciphertext slots: AES-256 in counter
/// mode, keyed by a 32-byte shared secret, with the 128-bit nonce as IV.
type SlotStream = Ctr128BE<Aes256>;

/// An encrypted ballot, as submitted with the cast-vote instruction.
/// Transient: it is folded into the election's encrypted tally by the MPC
/// `vote` circuit and never persisted independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBallot {
    /// One ciphertext slot holding the serialized candidate index.
    pub ciphertext: [u8; CIPHERTEXT_LEN],
    /// The single-use public half of the key exchange.
    pub encryption_pubkey: [u8; 32],
    /// The single-use nonce the ciphertext was produced under.
    pub nonce: u128,
}

/// A symmetric cipher over fixed-width slots, keyed by a shared secret
/// derived from an x25519 key exchange.
///
/// The same construction is used on both sides of the protocol: the client
/// encrypts a ballot under a (ephemeral, cluster) shared secret, and the MXE
/// keeps the running tally encrypted under its own internal key.
#[derive(Clone)]
pub struct SlotCipher {
    key: [u8; 32],
}

impl SlotCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the cipher from our secret and the other side's public key.
    pub fn from_key_exchange(secret: &StaticSecret, their_public: &PublicKey) -> Self {
        Self::new(secret.diffie_hellman(their_public).to_bytes())
    }

    /// Apply the keystream for `nonce` to `buf` in place. Counter mode, so
    /// encryption and decryption are the same operation.
    pub fn apply(&self, nonce: u128, buf: &mut [u8]) {
        let key = GenericArray::from_slice(&self.key);
        let iv = nonce.to_le_bytes();
        let mut stream = SlotStream::new(key, GenericArray::from_slice(&iv));
        stream.apply_keystream(buf);
    }

    /// Decrypt a single ballot slot back to its candidate index.
    pub fn decrypt_ballot(&self, ciphertext: &[u8; CIPHERTEXT_LEN], nonce: u128) -> u64 {
        let mut block = *ciphertext;
        self.apply(nonce, &mut block);
        u64::from_le_bytes(block[..8].try_into().expect("slice is 8 bytes")) // Infallible.
    }
}

/// Serialize a candidate index into one plaintext slot: u64 little-endian,
/// zero-padded to the slot width.
fn serialize_candidate(candidate: usize) -> [u8; CIPHERTEXT_LEN] {
    let mut block = [0; CIPHERTEXT_LEN];
    block[..8].copy_from_slice(&(candidate as u64).to_le_bytes());
    block
}

/// Encrypt a ballot for the MXE cluster.
///
/// Generates a fresh ephemeral key pair and a fresh nonce on every call;
/// the nonce cannot be supplied by the caller, so nonce reuse is
/// structurally impossible through this API. An out-of-range candidate
/// index is rejected before any key material is generated.
pub fn encrypt_ballot(
    candidate: usize,
    cluster_pubkey: &[u8; 32],
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<EncryptedBallot> {
    if candidate >= MAX_CANDIDATES {
        return Err(Error::Precondition(format!(
            "candidate index {candidate} out of range (max {})",
            MAX_CANDIDATES - 1
        )));
    }

    let secret = EphemeralSecret::random_from_rng(&mut *rng);
    let encryption_pubkey = PublicKey::from(&secret).to_bytes();
    let shared = secret.diffie_hellman(&PublicKey::from(*cluster_pubkey));
    let cipher = SlotCipher::new(shared.to_bytes());

    let nonce: u128 = rng.gen();
    let mut ciphertext = serialize_candidate(candidate);
    cipher.apply(nonce, &mut ciphertext);

    Ok(EncryptedBallot {
        ciphertext,
        encryption_pubkey,
        nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_keys() -> (StaticSecret, [u8; 32]) {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret).to_bytes();
        (secret, public)
    }

    #[test]
    fn fresh_nonces_make_ciphertexts_unlinkable() {
        let (_, cluster_pubkey) = cluster_keys();
        let mut rng = rand::thread_rng();

        let first = encrypt_ballot(2, &cluster_pubkey, &mut rng).unwrap();
        let second = encrypt_ballot(2, &cluster_pubkey, &mut rng).unwrap();

        assert_ne!(first.ciphertext, second.ciphertext);
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.encryption_pubkey, second.encryption_pubkey);
    }

    #[test]
    fn different_candidates_encrypt_differently() {
        let (_, cluster_pubkey) = cluster_keys();
        let mut rng = rand::thread_rng();

        let one = encrypt_ballot(1, &cluster_pubkey, &mut rng).unwrap();
        let two = encrypt_ballot(2, &cluster_pubkey, &mut rng).unwrap();
        assert_ne!(one.ciphertext, two.ciphertext);
    }

    #[test]
    fn cluster_can_recover_the_candidate() {
        let (cluster_secret, cluster_pubkey) = cluster_keys();
        let mut rng = rand::thread_rng();

        let ballot = encrypt_ballot(3, &cluster_pubkey, &mut rng).unwrap();
        let cipher = SlotCipher::from_key_exchange(
            &cluster_secret,
            &PublicKey::from(ballot.encryption_pubkey),
        );
        assert_eq!(cipher.decrypt_ballot(&ballot.ciphertext, ballot.nonce), 3);
    }

    #[test]
    fn out_of_range_candidate_is_rejected() {
        let (_, cluster_pubkey) = cluster_keys();
        let mut rng = rand::thread_rng();

        let err = encrypt_ballot(MAX_CANDIDATES, &cluster_pubkey, &mut rng).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }
}
