//! Protocol data model: account derivation, records, ballots, and requests.

pub mod account;
pub mod ballot;
pub mod election;
pub mod nullifier;
pub mod receipt;
pub mod request;
pub mod voter;
