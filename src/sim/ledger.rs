use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ledger::{AccountData, Ledger, LedgerError};
use crate::model::account::AccountId;
use crate::model::election::Election;

/// In-memory ledger backed by a single mutex-guarded map.
///
/// Holding the map lock across the whole insert gives `create_if_absent` the
/// required atomicity: of any set of racing creations for one identifier,
/// exactly one observes the vacant entry.
#[derive(Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<AccountId, AccountData>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    /// Mutate an election record in place. Used by the MXE simulator to fold
    /// computation outputs into the callback account, and by tests to warp
    /// the voting window.
    pub(crate) fn update_election(&self, id: &AccountId, mutate: impl FnOnce(&mut Election)) {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(AccountData::Election(election)) = accounts.get_mut(id) {
            mutate(election);
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn create_if_absent(&self, id: AccountId, data: AccountData) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&id) {
            return Err(LedgerError::AlreadyExists(id));
        }
        accounts.insert(id, data);
        Ok(())
    }

    async fn fetch(&self, id: AccountId) -> Result<Option<AccountData>, LedgerError> {
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use crate::model::voter::VoterProof;

    use super::*;

    fn proof(fill: u8) -> AccountData {
        AccountData::VoterProof(VoterProof {
            voter_hash: AccountId::example(fill),
            bump: 255,
        })
    }

    #[tokio::test]
    async fn create_if_absent_admits_exactly_one_creation() {
        let ledger = InMemoryLedger::new();
        let id = AccountId::example(1);

        ledger.create_if_absent(id, proof(1)).await.unwrap();
        let err = ledger.create_if_absent(id, proof(2)).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(existing) if existing == id));

        // The losing write must not have replaced the original.
        assert_eq!(ledger.fetch(id).await.unwrap(), Some(proof(1)));
    }

    #[tokio::test]
    async fn update_election_mutates_in_place() {
        let ledger = InMemoryLedger::new();
        let id = AccountId::example(2);
        let election = Election::open_example(AccountId::example(1));
        ledger
            .create_if_absent(id, AccountData::Election(election))
            .await
            .unwrap();

        ledger.update_election(&id, |record| record.total_votes = 9);
        match ledger.fetch(id).await.unwrap() {
            Some(AccountData::Election(record)) => assert_eq!(record.total_votes, 9),
            other => panic!("unexpected account data: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_of_a_missing_account_is_none() {
        let ledger = InMemoryLedger::new();
        assert_eq!(ledger.fetch(AccountId::example(9)).await.unwrap(), None);
    }
}
