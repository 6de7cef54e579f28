use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::debug;
use rand::Rng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::model::account::AccountId;
use crate::model::ballot::SlotCipher;
use crate::model::election::{ElectionState, CIPHERTEXT_LEN, MAX_CANDIDATES};
use crate::mxe::{Argument, Circuit, ComputationOffset, ComputationStatus, MxeCluster, MxeError};

use super::ledger::InMemoryLedger;

struct Job {
    circuit: Circuit,
    args: Vec<Argument>,
    callback: AccountId,
    polls_left: u32,
}

struct SimState {
    pending: HashMap<ComputationOffset, Job>,
    finalized: HashSet<ComputationOffset>,
    aborted: HashSet<ComputationOffset>,
    finalize_after: u32,
    stalled: bool,
    healthy: bool,
    key_available: bool,
    abort_next: bool,
}

/// Deterministic stand-in for the MPC execution environment.
///
/// Runs the three protocol circuits with real key exchange and slot
/// encryption: ballots are decrypted with the cluster secret, and the
/// running tally stays encrypted under an internal key that never leaves
/// the simulator. Computations finalize lazily, on the status poll that
/// exhausts their poll budget, so clients exercise the same polling loop
/// they would against a live cluster.
pub struct MxeSimulator {
    cluster_secret: StaticSecret,
    tally_cipher: SlotCipher,
    ledger: Arc<InMemoryLedger>,
    state: Mutex<SimState>,
}

impl MxeSimulator {
    pub fn new(ledger: Arc<InMemoryLedger>) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            cluster_secret: StaticSecret::random_from_rng(&mut rng),
            tally_cipher: SlotCipher::new(rng.gen()),
            ledger,
            state: Mutex::new(SimState {
                pending: HashMap::new(),
                finalized: HashSet::new(),
                aborted: HashSet::new(),
                finalize_after: 1,
                stalled: false,
                healthy: true,
                key_available: true,
                abort_next: false,
            }),
        }
    }

    /// Keep every computation pending forever.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().unwrap().stalled = stalled;
    }

    /// Number of status polls a computation stays pending before it
    /// executes and finalizes.
    pub fn set_finalize_after(&self, polls: u32) {
        self.state.lock().unwrap().finalize_after = polls.max(1);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().unwrap().healthy = healthy;
    }

    pub fn set_key_available(&self, available: bool) {
        self.state.lock().unwrap().key_available = available;
    }

    /// Abort the next queued computation instead of executing it.
    pub fn set_abort_next(&self, abort: bool) {
        self.state.lock().unwrap().abort_next = abort;
    }

    fn execute(&self, job: &Job) -> Result<(), String> {
        match job.circuit {
            Circuit::InitVoteStats => {
                let nonce: u128 = rand::thread_rng().gen();
                let tally = self.encrypt_tally(&[0; MAX_CANDIDATES], nonce);
                self.ledger.update_election(&job.callback, |election| {
                    election.encrypted_tally = tally;
                    election.nonce = nonce;
                    election.state = ElectionState::Open;
                });
                Ok(())
            }
            Circuit::Vote => {
                let (pubkey, vote_nonce, ciphertext) = match job.args.as_slice() {
                    [Argument::ArcisPubkey(pubkey), Argument::PlaintextU128(nonce), Argument::Encrypted(ciphertext), ..] => {
                        (*pubkey, *nonce, *ciphertext)
                    }
                    _ => return Err("malformed vote arguments".to_string()),
                };
                let shared =
                    SlotCipher::from_key_exchange(&self.cluster_secret, &PublicKey::from(pubkey));
                let candidate = shared.decrypt_ballot(&ciphertext, vote_nonce);

                // The callback account state at execution time is
                // authoritative for the running tally, not the snapshot the
                // client submitted.
                let fresh_nonce: u128 = rand::thread_rng().gen();
                self.ledger.update_election(&job.callback, |election| {
                    let mut counts = self.decrypt_tally(&election.encrypted_tally, election.nonce);
                    match usize::try_from(candidate) {
                        Ok(index) if index < MAX_CANDIDATES => counts[index] += 1,
                        // An out-of-range ballot is absorbed without
                        // touching any count.
                        _ => debug!("discarding ballot for invalid candidate {candidate}"),
                    }
                    election.encrypted_tally = self.encrypt_tally(&counts, fresh_nonce);
                    election.nonce = fresh_nonce;
                    election.total_votes += 1;
                });
                Ok(())
            }
            Circuit::RevealResult => {
                self.ledger.update_election(&job.callback, |election| {
                    election.final_result =
                        self.decrypt_tally(&election.encrypted_tally, election.nonce);
                    election.state = ElectionState::Revealed;
                });
                Ok(())
            }
        }
    }

    fn encrypt_tally(
        &self,
        counts: &[u64; MAX_CANDIDATES],
        nonce: u128,
    ) -> [[u8; CIPHERTEXT_LEN]; MAX_CANDIDATES] {
        let mut buf = [0u8; CIPHERTEXT_LEN * MAX_CANDIDATES];
        for (i, count) in counts.iter().enumerate() {
            buf[i * CIPHERTEXT_LEN..i * CIPHERTEXT_LEN + 8].copy_from_slice(&count.to_le_bytes());
        }
        self.tally_cipher.apply(nonce, &mut buf);

        let mut slots = [[0; CIPHERTEXT_LEN]; MAX_CANDIDATES];
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.copy_from_slice(&buf[i * CIPHERTEXT_LEN..(i + 1) * CIPHERTEXT_LEN]);
        }
        slots
    }

    fn decrypt_tally(
        &self,
        slots: &[[u8; CIPHERTEXT_LEN]; MAX_CANDIDATES],
        nonce: u128,
    ) -> [u64; MAX_CANDIDATES] {
        let mut buf = [0u8; CIPHERTEXT_LEN * MAX_CANDIDATES];
        for (i, slot) in slots.iter().enumerate() {
            buf[i * CIPHERTEXT_LEN..(i + 1) * CIPHERTEXT_LEN].copy_from_slice(slot);
        }
        self.tally_cipher.apply(nonce, &mut buf);

        let mut counts = [0u64; MAX_CANDIDATES];
        for (i, count) in counts.iter_mut().enumerate() {
            let offset = i * CIPHERTEXT_LEN;
            *count = u64::from_le_bytes(
                buf[offset..offset + 8].try_into().expect("slice is 8 bytes"), // Infallible.
            );
        }
        counts
    }
}

#[async_trait]
impl MxeCluster for MxeSimulator {
    async fn cluster_pubkey(&self) -> Result<[u8; 32], MxeError> {
        if !self.state.lock().unwrap().key_available {
            return Err(MxeError::PublicKeyUnavailable);
        }
        Ok(PublicKey::from(&self.cluster_secret).to_bytes())
    }

    async fn healthy(&self) -> bool {
        self.state.lock().unwrap().healthy
    }

    async fn queue(
        &self,
        circuit: Circuit,
        offset: ComputationOffset,
        args: Vec<Argument>,
        callback: AccountId,
    ) -> Result<(), MxeError> {
        let mut state = self.state.lock().unwrap();
        if state.abort_next {
            state.abort_next = false;
            state.aborted.insert(offset);
            return Ok(());
        }
        let polls_left = state.finalize_after;
        state.pending.insert(
            offset,
            Job {
                circuit,
                args,
                callback,
                polls_left,
            },
        );
        Ok(())
    }

    async fn status(&self, offset: ComputationOffset) -> Result<ComputationStatus, MxeError> {
        let job = {
            let mut state = self.state.lock().unwrap();
            if state.stalled {
                return Ok(ComputationStatus::Pending);
            }
            if state.finalized.contains(&offset) {
                return Ok(ComputationStatus::Finalized);
            }
            if state.aborted.contains(&offset) {
                return Ok(ComputationStatus::Aborted);
            }
            match state.pending.get_mut(&offset) {
                Some(job) if job.polls_left > 1 => {
                    job.polls_left -= 1;
                    return Ok(ComputationStatus::Pending);
                }
                Some(_) => match state.pending.remove(&offset) {
                    Some(job) => job,
                    None => return Err(MxeError::UnknownComputation(offset)),
                },
                None => return Err(MxeError::UnknownComputation(offset)),
            }
        };

        // Execute outside the state lock; the circuit touches the ledger.
        match self.execute(&job) {
            Ok(()) => {
                self.state.lock().unwrap().finalized.insert(offset);
                Ok(ComputationStatus::Finalized)
            }
            Err(reason) => {
                debug!("computation {offset} aborted: {reason}");
                self.state.lock().unwrap().aborted.insert(offset);
                Ok(ComputationStatus::Aborted)
            }
        }
    }
}
