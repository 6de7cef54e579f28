use crate::error::{Error, Result};
use crate::mxe::{Circuit, ComputationOffset};

use super::account::AccountId;
use super::ballot::EncryptedBallot;
use super::election::{CIPHERTEXT_LEN, MAX_TITLE_LEN};

/// Voter registry chunk index carried for wire compatibility. Under the
/// global-registry design the registry is keyed by voter hash alone, so the
/// index is always zero.
pub const VOTER_CHUNK_INDEX: u32 = 0;

/// A protocol instruction, validated at construction.
///
/// One canonical representation per instruction replaces the ad hoc payload
/// assembly of earlier clients; anything that would be rejected on the wire
/// is rejected here, before serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Create an election and queue `init_vote_stats`.
    InitElection {
        computation_offset: ComputationOffset,
        election_id: u64,
        title: String,
        start_time: u64,
        end_time: u64,
        nonce: u128,
    },
    /// Register one voter hash in the global registry.
    RegisterVoter {
        chunk_index: u32,
        voter_hash: AccountId,
    },
    /// Cast an encrypted ballot and queue `vote`.
    CastVote {
        computation_offset: ComputationOffset,
        voter_chunk_index: u32,
        vote_ciphertext: [u8; CIPHERTEXT_LEN],
        vote_encryption_pubkey: [u8; 32],
        vote_nonce: u128,
        nullifier_hash: AccountId,
        voter_hash: AccountId,
    },
    /// Queue `reveal_result` for a closed election.
    RevealResult {
        computation_offset: ComputationOffset,
        election_id: u64,
    },
    /// Create one computation definition.
    InitCompDef { circuit: Circuit },
}

impl Instruction {
    pub fn init_election(
        computation_offset: ComputationOffset,
        election_id: u64,
        title: &str,
        start_time: u64,
        end_time: u64,
        nonce: u128,
    ) -> Result<Self> {
        if title.is_empty() || title.len() > MAX_TITLE_LEN {
            return Err(Error::Precondition(format!(
                "title must be 1..={MAX_TITLE_LEN} bytes, got {}",
                title.len()
            )));
        }
        if start_time >= end_time {
            return Err(Error::Precondition(format!(
                "start time {start_time} must precede end time {end_time}"
            )));
        }
        Ok(Self::InitElection {
            computation_offset,
            election_id,
            title: title.to_string(),
            start_time,
            end_time,
            nonce,
        })
    }

    pub fn register_voter(voter_hash: AccountId) -> Self {
        Self::RegisterVoter {
            chunk_index: VOTER_CHUNK_INDEX,
            voter_hash,
        }
    }

    pub fn cast_vote(
        computation_offset: ComputationOffset,
        ballot: &EncryptedBallot,
        nullifier_hash: AccountId,
        voter_hash: AccountId,
    ) -> Self {
        Self::CastVote {
            computation_offset,
            voter_chunk_index: VOTER_CHUNK_INDEX,
            vote_ciphertext: ballot.ciphertext,
            vote_encryption_pubkey: ballot.encryption_pubkey,
            vote_nonce: ballot.nonce,
            nullifier_hash,
            voter_hash,
        }
    }

    pub fn reveal_result(computation_offset: ComputationOffset, election_id: u64) -> Self {
        Self::RevealResult {
            computation_offset,
            election_id,
        }
    }

    /// The instruction tag on the wire.
    pub fn tag(&self) -> u8 {
        match self {
            Self::InitElection { .. } => 0,
            Self::RegisterVoter { .. } => 1,
            Self::CastVote { .. } => 2,
            Self::RevealResult { .. } => 3,
            Self::InitCompDef { .. } => 4,
        }
    }

    /// Serialize to the wire layout: tag byte, then fields in declaration
    /// order, integers little-endian, strings length-prefixed (u32).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.tag()];
        match self {
            Self::InitElection {
                computation_offset,
                election_id,
                title,
                start_time,
                end_time,
                nonce,
            } => {
                buf.extend(computation_offset.to_le_bytes());
                buf.extend(election_id.to_le_bytes());
                buf.extend((title.len() as u32).to_le_bytes());
                buf.extend(title.as_bytes());
                buf.extend(start_time.to_le_bytes());
                buf.extend(end_time.to_le_bytes());
                buf.extend(nonce.to_le_bytes());
            }
            Self::RegisterVoter {
                chunk_index,
                voter_hash,
            } => {
                buf.extend(chunk_index.to_le_bytes());
                buf.extend(voter_hash.as_bytes());
            }
            Self::CastVote {
                computation_offset,
                voter_chunk_index,
                vote_ciphertext,
                vote_encryption_pubkey,
                vote_nonce,
                nullifier_hash,
                voter_hash,
            } => {
                buf.extend(computation_offset.to_le_bytes());
                buf.extend(voter_chunk_index.to_le_bytes());
                buf.extend(vote_ciphertext);
                buf.extend(vote_encryption_pubkey);
                buf.extend(vote_nonce.to_le_bytes());
                buf.extend(nullifier_hash.as_bytes());
                buf.extend(voter_hash.as_bytes());
            }
            Self::RevealResult {
                computation_offset,
                election_id,
            } => {
                buf.extend(computation_offset.to_le_bytes());
                buf.extend(election_id.to_le_bytes());
            }
            Self::InitCompDef { circuit } => {
                buf.extend(circuit.comp_def_offset().to_le_bytes());
            }
        }
        buf
    }
}
