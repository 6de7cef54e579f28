//! The protocol sequencer.
//!
//! [`VoteClient`] drives every lifecycle operation end to end: validate
//! locally, create the ledger accounts, queue the confidential computation,
//! and await its finalization. It holds no session state; all shared state
//! lives behind the injected [`Ledger`] and [`MxeCluster`].

mod finalize;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use log::{debug, info};
use rand::Rng;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::{AccountData, Ledger, LedgerError};
use crate::model::account::{self, AccountId, ProgramId};
use crate::model::ballot;
use crate::model::election::{Election, ElectionState, MAX_CANDIDATES};
use crate::model::nullifier::{compute_nullifier, Nullifier};
use crate::model::receipt::{compute_receipt, ReceiptRecord, VoteReceipt};
use crate::model::request::Instruction;
use crate::model::voter::VoterProof;
use crate::mxe::{Argument, Circuit, ComputationDefinition, ComputationOffset, MxeCluster, MxeError};

/// Client for the confidential voting protocol, generic over the ledger and
/// MPC execution environment it runs against.
pub struct VoteClient<L, M> {
    config: Config,
    program: ProgramId,
    ledger: Arc<L>,
    mxe: Arc<M>,
}

impl<L, M> VoteClient<L, M>
where
    L: Ledger,
    M: MxeCluster,
{
    pub fn new(config: Config, program: ProgramId, ledger: Arc<L>, mxe: Arc<M>) -> Self {
        Self {
            config,
            program,
            ledger,
            mxe,
        }
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Create the computation definitions for all protocol circuits.
    ///
    /// Idempotent: definitions that already exist are left untouched, so
    /// this can be called unconditionally at deployment.
    pub async fn init_comp_defs(&self, authority: &AccountId) -> Result<()> {
        for circuit in Circuit::ALL {
            let offset = circuit.comp_def_offset();
            let instruction = Instruction::InitCompDef { circuit };
            debug!(
                "submitting {} byte init-comp-def request",
                instruction.encode().len()
            );
            let (def_account, _) = account::comp_def_account(&self.program, offset);
            let definition = ComputationDefinition {
                offset,
                circuit: circuit.name().to_string(),
                authority: *authority,
            };
            let data = AccountData::ComputationDefinition(definition);
            match self.ledger.create_if_absent(def_account, data).await {
                Ok(()) => debug!("created computation definition {} ({offset:#010x})", circuit.name()),
                Err(LedgerError::AlreadyExists(_)) => {
                    debug!("computation definition {} already present", circuit.name());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Create an election and initialize its encrypted tally.
    ///
    /// The election account is created in `Draft`; the `init_vote_stats`
    /// computation flips it to `Open` on finalization. A second creation
    /// under the same (creator, election id) pair fails with
    /// [`Error::Conflict`].
    pub async fn create_election(
        &self,
        creator: &AccountId,
        election_id: u64,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AccountId> {
        let start_time = unix_seconds(start, "start time")?;
        let end_time = unix_seconds(end, "end time")?;
        let (computation_offset, nonce) = {
            let mut rng = rand::thread_rng();
            (rng.gen::<ComputationOffset>(), rng.gen::<u128>())
        };
        let instruction = Instruction::init_election(
            computation_offset,
            election_id,
            title,
            start_time,
            end_time,
            nonce,
        )?;

        if !self.mxe.healthy().await {
            return Err(Error::Mxe(MxeError::Unhealthy));
        }
        let cluster_pubkey = self.cluster_pubkey().await?;
        debug!("MXE cluster key {} available", HEXLOWER.encode(&cluster_pubkey));

        let (election_account, bump) = account::election_account(&self.program, creator, election_id);
        debug!(
            "submitting {} byte init-election request for {election_account}",
            instruction.encode().len()
        );
        let record = Election::new(
            *creator,
            election_id,
            title.to_string(),
            start_time,
            end_time,
            bump,
        );
        self.ledger
            .create_if_absent(election_account, AccountData::Election(record))
            .await
            .map_err(|err| conflict_on_exists(err, "election already exists"))?;

        self.mxe
            .queue(Circuit::InitVoteStats, computation_offset, Vec::new(), election_account)
            .await?;
        self.await_finalization(computation_offset).await?;

        let election = self.fetch_election(election_account).await?;
        if election.state == ElectionState::Draft {
            return Err(Error::Ledger(LedgerError::Backend(
                "election tally was not initialized".to_string(),
            )));
        }
        info!("election {election_account} created, voting window [{start_time}, {end_time})");
        Ok(election_account)
    }

    /// Register a voter hash in the global registry. The proof account's
    /// existence is the registration; a second registration of the same hash
    /// fails with [`Error::Conflict`].
    pub async fn register_voter(&self, voter_hash: AccountId) -> Result<AccountId> {
        let (proof_account, bump) = account::voter_proof_account(&self.program, &voter_hash);
        let instruction = Instruction::register_voter(voter_hash);
        debug!(
            "submitting {} byte register-voter request",
            instruction.encode().len()
        );
        let proof = VoterProof { voter_hash, bump };
        self.ledger
            .create_if_absent(proof_account, AccountData::VoterProof(proof))
            .await
            .map_err(|err| conflict_on_exists(err, "voter hash already registered"))?;
        info!("registered voter {voter_hash}");
        Ok(proof_account)
    }

    /// Cast an encrypted ballot for `candidate`.
    ///
    /// Preconditions are checked in order: the election must be open, the
    /// voter hash registered, and the candidate index in range; all of these
    /// fail before any ledger account is created. Double votes are refused
    /// by the nullifier account collision, atomically, whatever the
    /// interleaving of concurrent casts.
    pub async fn cast_vote(
        &self,
        voter_hash: AccountId,
        election: AccountId,
        candidate: usize,
    ) -> Result<VoteReceipt> {
        let record = self.fetch_election(election).await?;
        let now = Utc::now();
        if !record.voting_open(now) {
            return Err(Error::Precondition(
                match record.phase(now) {
                    ElectionState::Draft => "election tally is not initialized yet",
                    ElectionState::Open => "voting has not opened yet",
                    ElectionState::Closed => "voting window has closed",
                    ElectionState::Revealed => "election result has already been revealed",
                }
                .to_string(),
            ));
        }

        let (proof_account, _) = account::voter_proof_account(&self.program, &voter_hash);
        let registered = self
            .ledger
            .fetch(proof_account)
            .await?
            .as_ref()
            .and_then(AccountData::as_voter_proof)
            .is_some();
        if !registered {
            return Err(Error::Precondition(format!(
                "voter hash {voter_hash} is not registered"
            )));
        }

        let cluster_pubkey = self.cluster_pubkey().await?;
        let (encrypted, receipt_seed, computation_offset) = {
            let mut rng = rand::thread_rng();
            let encrypted = ballot::encrypt_ballot(candidate, &cluster_pubkey, &mut rng)?;
            (encrypted, rng.gen::<[u8; 32]>(), rng.gen::<ComputationOffset>())
        };

        let nullifier_hash = compute_nullifier(&voter_hash, &election);
        let (nullifier_account, nullifier_bump) =
            account::nullifier_account(&self.program, &election, &nullifier_hash);
        let nullifier = Nullifier {
            election,
            nullifier_hash,
            bump: nullifier_bump,
        };
        self.ledger
            .create_if_absent(nullifier_account, AccountData::Nullifier(nullifier))
            .await
            .map_err(|err| conflict_on_exists(err, "vote already cast in this election"))?;

        let receipt_id = compute_receipt(&receipt_seed, &election);
        let (receipt_account, receipt_bump) =
            account::receipt_account(&self.program, &election, &receipt_id);
        let receipt = ReceiptRecord {
            election,
            receipt_id,
            bump: receipt_bump,
        };
        self.ledger
            .create_if_absent(receipt_account, AccountData::Receipt(receipt))
            .await
            .map_err(|err| conflict_on_exists(err, "receipt identifier collision"))?;

        let instruction =
            Instruction::cast_vote(computation_offset, &encrypted, nullifier_hash, voter_hash);
        debug!(
            "submitting {} byte cast-vote request for {election}",
            instruction.encode().len()
        );
        let mut args = vec![
            Argument::ArcisPubkey(encrypted.encryption_pubkey),
            Argument::PlaintextU128(encrypted.nonce),
            Argument::Encrypted(encrypted.ciphertext),
            Argument::PlaintextU128(record.nonce),
        ];
        args.extend(record.encrypted_tally.iter().map(|slot| Argument::Encrypted(*slot)));
        self.mxe
            .queue(Circuit::Vote, computation_offset, args, election)
            .await?;
        self.await_finalization(computation_offset).await?;

        let updated = self.fetch_election(election).await?;
        debug!(
            "election {election} now counts {} accepted vote(s)",
            updated.total_votes
        );
        info!("vote accepted for election {election}, receipt {receipt_id}");
        Ok(VoteReceipt {
            election,
            receipt_id,
            nullifier_hash,
        })
    }

    /// Decrypt and publish the final tally of a closed election.
    ///
    /// Only the creator may reveal, and only once the voting window has
    /// passed. Revealing an already revealed election returns the published
    /// result without queueing anything.
    pub async fn reveal_result(
        &self,
        authority: &AccountId,
        election: AccountId,
    ) -> Result<[u64; MAX_CANDIDATES]> {
        let record = self.fetch_election(election).await?;
        if record.creator != *authority {
            return Err(Error::Unauthorized(
                "only the election creator may reveal the result".to_string(),
            ));
        }
        let now = Utc::now();
        match record.phase(now) {
            ElectionState::Revealed => {
                debug!("election {election} already revealed");
                return Ok(record.final_result);
            }
            ElectionState::Draft => {
                return Err(Error::Precondition(
                    "election tally is not initialized yet".to_string(),
                ));
            }
            ElectionState::Open => {
                return Err(Error::Precondition(
                    "voting window has not closed yet".to_string(),
                ));
            }
            ElectionState::Closed => {}
        }

        let computation_offset: ComputationOffset = rand::thread_rng().gen();
        let instruction = Instruction::reveal_result(computation_offset, record.election_id);
        debug!(
            "submitting {} byte reveal-result request for {election}",
            instruction.encode().len()
        );
        let mut args = vec![Argument::PlaintextU128(record.nonce)];
        args.extend(record.encrypted_tally.iter().map(|slot| Argument::Encrypted(*slot)));
        self.mxe
            .queue(Circuit::RevealResult, computation_offset, args, election)
            .await?;
        self.await_finalization(computation_offset).await?;

        let revealed = self.fetch_election(election).await?;
        if revealed.state != ElectionState::Revealed {
            return Err(Error::Ledger(LedgerError::Backend(
                "reveal finalized without publishing a result".to_string(),
            )));
        }
        info!(
            "election {election} revealed after {} vote(s)",
            revealed.total_votes
        );
        Ok(revealed.final_result)
    }

    /// Check whether a receipt was issued for this election. Read-only.
    pub async fn verify_receipt(&self, election: AccountId, receipt_id: AccountId) -> Result<bool> {
        let (receipt_account, _) = account::receipt_account(&self.program, &election, &receipt_id);
        Ok(matches!(
            self.ledger.fetch(receipt_account).await?,
            Some(AccountData::Receipt(record)) if record.receipt_id == receipt_id
        ))
    }

    /// Fetch the current election record.
    pub async fn fetch_election(&self, election: AccountId) -> Result<Election> {
        match self.ledger.fetch(election).await? {
            Some(AccountData::Election(record)) => Ok(record),
            Some(_) => Err(Error::NotFound(format!(
                "account {election} is not an election"
            ))),
            None => Err(Error::NotFound(format!("election {election} does not exist"))),
        }
    }

    async fn await_finalization(&self, offset: ComputationOffset) -> Result<()> {
        finalize::await_finalization(
            self.mxe.as_ref(),
            offset,
            self.config.finalize_attempts(),
            self.config.finalize_delay(),
        )
        .await
    }

    async fn cluster_pubkey(&self) -> Result<[u8; 32]> {
        finalize::cluster_pubkey_with_retry(
            self.mxe.as_ref(),
            self.config.key_fetch_attempts(),
            self.config.key_fetch_delay(),
        )
        .await
    }
}

fn unix_seconds(instant: DateTime<Utc>, what: &str) -> Result<u64> {
    u64::try_from(instant.timestamp())
        .map_err(|_| Error::Precondition(format!("{what} predates the unix epoch")))
}

fn conflict_on_exists(err: LedgerError, message: &str) -> Error {
    match err {
        LedgerError::AlreadyExists(_) => Error::Conflict(message.to_string()),
        other => Error::Ledger(other),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sim_test::sim_test;

    use crate::model::account::nullifier_account;
    use crate::model::election::CIPHERTEXT_LEN;
    use crate::model::voter::voter_hash;
    use crate::sim::{SimClient, Simulation};

    use super::*;

    const SALT: &[u8] = b"galactic salt";

    fn window_around_now() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::seconds(60), now + Duration::seconds(3600))
    }

    /// Create the computation definitions and an election that is open right
    /// now.
    async fn open_election(client: &SimClient, creator: &AccountId) -> AccountId {
        client.init_comp_defs(creator).await.unwrap();
        let (start, end) = window_around_now();
        client
            .create_election(creator, 123, "Galactic President Election", start, end)
            .await
            .unwrap()
    }

    #[sim_test]
    async fn full_lifecycle_counts_the_vote(client: SimClient, sim: Simulation) {
        // This test exercises every protocol step, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["csvp_client"], None, None);

        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;

        let record = client.fetch_election(election).await.unwrap();
        assert_eq!(record.state, ElectionState::Open);
        assert_ne!(record.encrypted_tally, [[0; CIPHERTEXT_LEN]; MAX_CANDIDATES]);

        let voter = voter_hash(b"alice", SALT);
        client.register_voter(voter).await.unwrap();
        let receipt = client.cast_vote(voter, election, 2).await.unwrap();
        assert!(client
            .verify_receipt(election, receipt.receipt_id)
            .await
            .unwrap());

        sim.close_voting(&election);
        let result = client.reveal_result(&creator, election).await.unwrap();
        assert_eq!(result, [0, 0, 1, 0, 0]);

        let record = client.fetch_election(election).await.unwrap();
        assert_eq!(record.state, ElectionState::Revealed);
        assert_eq!(record.total_votes, 1);
    }

    #[sim_test]
    async fn second_vote_is_rejected_and_not_counted(client: SimClient, sim: Simulation) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;
        let voter = voter_hash(b"alice", SALT);
        client.register_voter(voter).await.unwrap();

        client.cast_vote(voter, election, 2).await.unwrap();
        let err = client.cast_vote(voter, election, 3).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        sim.close_voting(&election);
        let result = client.reveal_result(&creator, election).await.unwrap();
        assert_eq!(result, [0, 0, 1, 0, 0]);
    }

    #[sim_test]
    async fn unregistered_voter_fails_before_any_account_is_created(
        client: SimClient,
        sim: Simulation,
    ) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;
        let voter = voter_hash(b"mallory", SALT);

        let err = client.cast_vote(voter, election, 0).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));

        let digest = compute_nullifier(&voter, &election);
        let (account, _) = nullifier_account(&sim.program, &election, &digest);
        assert!(sim.ledger.fetch(account).await.unwrap().is_none());
    }

    #[sim_test]
    async fn out_of_range_candidate_is_rejected(client: SimClient, _sim: Simulation) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;
        let voter = voter_hash(b"alice", SALT);
        client.register_voter(voter).await.unwrap();

        let err = client
            .cast_vote(voter, election, MAX_CANDIDATES)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[sim_test]
    async fn votes_outside_the_window_are_rejected(client: SimClient, _sim: Simulation) {
        let creator = AccountId::example(1);
        client.init_comp_defs(&creator).await.unwrap();
        let now = Utc::now();
        let election = client
            .create_election(
                &creator,
                7,
                "Future Election",
                now + Duration::seconds(600),
                now + Duration::seconds(3600),
            )
            .await
            .unwrap();

        let voter = voter_hash(b"alice", SALT);
        client.register_voter(voter).await.unwrap();
        let err = client.cast_vote(voter, election, 1).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[sim_test]
    async fn reveal_before_close_is_rejected(client: SimClient, sim: Simulation) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;

        let err = client.reveal_result(&creator, election).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));

        sim.close_voting(&election);
        client.reveal_result(&creator, election).await.unwrap();
    }

    #[sim_test]
    async fn only_the_creator_may_reveal(client: SimClient, sim: Simulation) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;
        sim.close_voting(&election);

        let err = client
            .reveal_result(&AccountId::example(2), election)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[sim_test]
    async fn reveal_is_idempotent(client: SimClient, sim: Simulation) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;
        let voter = voter_hash(b"alice", SALT);
        client.register_voter(voter).await.unwrap();
        client.cast_vote(voter, election, 4).await.unwrap();
        sim.close_voting(&election);

        let first = client.reveal_result(&creator, election).await.unwrap();
        let second = client.reveal_result(&creator, election).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, [0, 0, 0, 0, 1]);
    }

    #[sim_test]
    async fn duplicate_election_id_conflicts(client: SimClient, _sim: Simulation) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;
        let record = client.fetch_election(election).await.unwrap();

        let (start, end) = window_around_now();
        let err = client
            .create_election(&creator, record.election_id, "Rerun", start, end)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[sim_test]
    async fn duplicate_registration_conflicts(client: SimClient, _sim: Simulation) {
        let voter = voter_hash(b"alice", SALT);
        client.register_voter(voter).await.unwrap();
        let err = client.register_voter(voter).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[sim_test]
    async fn unknown_receipt_does_not_verify(client: SimClient, _sim: Simulation) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;
        let verified = client
            .verify_receipt(election, AccountId::example(0xEE))
            .await
            .unwrap();
        assert!(!verified);
    }

    #[sim_test]
    async fn racing_casts_admit_exactly_one(client: SimClient, sim: Simulation) {
        let creator = AccountId::example(1);
        let election = open_election(&client, &creator).await;
        let voter = voter_hash(b"alice", SALT);
        client.register_voter(voter).await.unwrap();

        let client = Arc::new(client);
        let first = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.cast_vote(voter, election, 1).await }
        });
        let second = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.cast_vote(voter, election, 2).await }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::Conflict(_)))));

        sim.close_voting(&election);
        let result = client.reveal_result(&creator, election).await.unwrap();
        assert_eq!(result.iter().sum::<u64>(), 1);
    }

    #[tokio::test]
    async fn stalled_cluster_surfaces_a_finalization_timeout() {
        let sim = Simulation::new();
        sim.mxe.set_stalled(true);
        let client = sim.client(Config::fast_example());

        let (start, end) = window_around_now();
        let err = client
            .create_election(&AccountId::example(1), 9, "Stalled", start, end)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FinalizationTimeout { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn slow_finalization_succeeds_within_the_attempt_budget() {
        let sim = Simulation::new();
        sim.mxe.set_finalize_after(3);
        let client = sim.client(Config::fast_example());

        let (start, end) = window_around_now();
        client
            .create_election(&AccountId::example(1), 10, "Slow", start, end)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unhealthy_cluster_refuses_election_creation() {
        let sim = Simulation::new();
        sim.mxe.set_healthy(false);
        let client = sim.client(Config::fast_example());

        let (start, end) = window_around_now();
        let err = client
            .create_election(&AccountId::example(1), 11, "Unhealthy", start, end)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Mxe(MxeError::Unhealthy)));
    }

    #[tokio::test]
    async fn missing_cluster_key_exhausts_its_retry_budget() {
        let sim = Simulation::new();
        sim.mxe.set_key_available(false);
        let client = sim.client(Config::fast_example());

        let (start, end) = window_around_now();
        let err = client
            .create_election(&AccountId::example(1), 12, "Keyless", start, end)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Mxe(MxeError::PublicKeyUnavailable)));
    }

    #[tokio::test]
    async fn aborted_computation_is_surfaced() {
        let sim = Simulation::new();
        sim.mxe.set_abort_next(true);
        let client = sim.client(Config::fast_example());

        let (start, end) = window_around_now();
        let err = client
            .create_election(&AccountId::example(1), 13, "Aborted", start, end)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Mxe(MxeError::Aborted(_))));
    }
}
