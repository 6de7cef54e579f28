//! Client for a confidential voting protocol running on a shared ledger
//! with an MPC execution environment (MXE).
//!
//! Ballots are encrypted on the client under a key shared with the MXE
//! cluster and only ever tallied inside the confidential computation;
//! double votes are prevented by deterministic nullifier accounts and the
//! ledger's create-if-absent semantics. [`client::VoteClient`] drives the
//! whole lifecycle against any [`ledger::Ledger`] and [`mxe::MxeCluster`]
//! implementation; [`sim`] provides in-process implementations of both.

pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod mxe;
pub mod sim;

pub use client::VoteClient;
pub use config::Config;
pub use error::{Error, Result};
