use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::account::AccountId;

/// Fixed number of candidate slots per election.
pub const MAX_CANDIDATES: usize = 5;

/// Maximum length of an election title, matching the on-chain account layout.
pub const MAX_TITLE_LEN: usize = 50;

/// Width of one ciphertext slot in the encrypted tally.
pub const CIPHERTEXT_LEN: usize = 32;

/// Core election data, as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// The creator's identity; authority for reveal.
    pub creator: AccountId,
    /// Caller-chosen election identifier, unique per creator.
    pub election_id: u64,
    /// Election title.
    pub title: String,
    /// Voting opens at this unix timestamp (seconds).
    pub start_time: u64,
    /// Voting closes at this unix timestamp (seconds).
    pub end_time: u64,
    /// Stored lifecycle state. `Closed` is never stored; it is computed
    /// from `end_time`.
    pub state: ElectionState,
    /// Public count of accepted votes.
    pub total_votes: u32,
    /// Bump used when deriving the election account.
    pub bump: u8,
    /// Nonce under which the current encrypted tally was produced.
    /// Rotated by the MXE on every tally update.
    pub nonce: u128,
    /// Per-candidate encrypted tally; initialized to an encrypted zero
    /// vector by the `init_vote_stats` computation.
    pub encrypted_tally: [[u8; CIPHERTEXT_LEN]; MAX_CANDIDATES],
    /// Plaintext result, all-zero until reveal completes.
    pub final_result: [u64; MAX_CANDIDATES],
}

impl Election {
    /// A freshly created election, before the MXE has initialized its tally.
    pub fn new(creator: AccountId, election_id: u64, title: String, start_time: u64, end_time: u64, bump: u8) -> Self {
        Self {
            creator,
            election_id,
            title,
            start_time,
            end_time,
            state: ElectionState::Draft,
            total_votes: 0,
            bump,
            nonce: 0,
            encrypted_tally: [[0; CIPHERTEXT_LEN]; MAX_CANDIDATES],
            final_result: [0; MAX_CANDIDATES],
        }
    }

    /// The effective lifecycle phase at the given instant.
    pub fn phase(&self, now: DateTime<Utc>) -> ElectionState {
        match self.state {
            ElectionState::Draft => ElectionState::Draft,
            ElectionState::Revealed => ElectionState::Revealed,
            ElectionState::Open | ElectionState::Closed => {
                if (now.timestamp().max(0) as u64) < self.end_time {
                    ElectionState::Open
                } else {
                    ElectionState::Closed
                }
            }
        }
    }

    /// True iff a vote is accepted at the given instant: the tally is
    /// initialized and `now` lies within `[start_time, end_time)`.
    pub fn voting_open(&self, now: DateTime<Utc>) -> bool {
        let now = now.timestamp().max(0) as u64;
        self.state == ElectionState::Open && now >= self.start_time && now < self.end_time
    }
}

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ElectionState {
    /// Created, but the encrypted tally has not yet been initialized by the
    /// MXE. Not yet usable for voting.
    Draft,
    /// Tally initialized; voting accepted within the configured window.
    Open,
    /// The voting window has passed; awaiting reveal. Computed, never stored.
    Closed,
    /// Final result decrypted and published. Terminal.
    Revealed,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Election {
        /// An election whose voting window contains the present moment.
        pub fn open_example(creator: AccountId) -> Self {
            let now = Utc::now().timestamp() as u64;
            let mut election = Election::new(
                creator,
                123,
                "Galactic President Election".to_string(),
                now - 60,
                now + 3600,
                255,
            );
            election.state = ElectionState::Open;
            election
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    #[test]
    fn draft_elections_do_not_accept_votes() {
        let election = Election::new(AccountId::example(1), 1, "t".into(), 100, 200, 255);
        assert_eq!(election.phase(at(150)), ElectionState::Draft);
        assert!(!election.voting_open(at(150)));
    }

    #[test]
    fn phase_follows_the_voting_window() {
        let mut election = Election::new(AccountId::example(1), 1, "t".into(), 100, 200, 255);
        election.state = ElectionState::Open;

        assert_eq!(election.phase(at(150)), ElectionState::Open);
        assert_eq!(election.phase(at(200)), ElectionState::Closed);
        assert_eq!(election.phase(at(500)), ElectionState::Closed);

        assert!(!election.voting_open(at(99)));
        assert!(election.voting_open(at(100)));
        assert!(election.voting_open(at(199)));
        assert!(!election.voting_open(at(200)));
    }

    #[test]
    fn revealed_is_terminal() {
        let mut election = Election::new(AccountId::example(1), 1, "t".into(), 100, 200, 255);
        election.state = ElectionState::Revealed;
        assert_eq!(election.phase(at(150)), ElectionState::Revealed);
        assert!(!election.voting_open(at(150)));
    }
}
