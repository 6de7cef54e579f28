//! In-process simulation of the ledger and MPC execution environment.
//!
//! Backs the end-to-end tests and the lifecycle demo with the real client
//! code paths: the only substitutions are an in-memory account map for the
//! ledger and a single-party stand-in for the cluster.

mod cluster;
mod ledger;

use std::sync::Arc;

use chrono::Utc;

use crate::client::VoteClient;
use crate::config::Config;
use crate::model::account::{AccountId, ProgramId};

pub use cluster::MxeSimulator;
pub use ledger::InMemoryLedger;

/// A client wired to the simulated platform.
pub type SimClient = VoteClient<InMemoryLedger, MxeSimulator>;

/// One simulated deployment: a program id, a ledger, and an MXE cluster.
pub struct Simulation {
    pub program: ProgramId,
    pub ledger: Arc<InMemoryLedger>,
    pub mxe: Arc<MxeSimulator>,
}

impl Simulation {
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        Self {
            program: ProgramId(rand::random()),
            mxe: Arc::new(MxeSimulator::new(Arc::clone(&ledger))),
            ledger,
        }
    }

    /// Build a client against this deployment.
    pub fn client(&self, config: Config) -> SimClient {
        VoteClient::new(
            config,
            self.program,
            Arc::clone(&self.ledger),
            Arc::clone(&self.mxe),
        )
    }

    /// Warp the election's voting window into the past, so the next phase
    /// computation sees it as closed. Time travel for tests and demos.
    pub fn close_voting(&self, election: &AccountId) {
        let now = Utc::now().timestamp().max(0) as u64;
        self.ledger.update_election(election, |record| {
            record.end_time = record.end_time.min(now.saturating_sub(1));
            record.start_time = record.start_time.min(record.end_time);
        });
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
