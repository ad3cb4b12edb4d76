//! Maps EVM accounts and storage onto the chaincode key-value state.
//!
//! Layout:
//! - `hex(address)` -> bincode encoded [`StoredAccount`]
//! - `hex(address) ++ hex(slot)` -> raw 32 byte slot value
//!
//! Only accounts carrying code are persisted. Callers are derived from ledger
//! identities and have no state of their own.

use std::collections::HashMap;

use revm::{
    Database,
    bytecode::Bytecode,
    primitives::{
        Address,
        B256,
        KECCAK_EMPTY,
        U256,
        keccak256,
    },
    state::{
        AccountInfo,
        EvmState,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use tracing::trace;

use crate::{
    error::StateError,
    stub::ChaincodeStub,
};

/// Account record stored under the lowercase hex address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub nonce: u64,
    pub code: Vec<u8>,
}

impl StoredAccount {
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self, StateError> {
        bincode::deserialize(bytes).map_err(|source| {
            StateError::DecodeAccount {
                key: key.to_string(),
                source,
            }
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(self).map_err(StateError::EncodeAccount)
    }

    fn into_info(self) -> AccountInfo {
        let code_hash = if self.code.is_empty() {
            KECCAK_EMPTY
        } else {
            keccak256(&self.code)
        };
        AccountInfo {
            balance: U256::ZERO,
            nonce: self.nonce,
            code_hash,
            code: Some(Bytecode::new_legacy(self.code.into())),
        }
    }
}

pub fn account_key(address: &Address) -> String {
    hex::encode(address)
}

pub fn storage_key(address: &Address, slot: &B256) -> String {
    let mut key = account_key(address);
    key.push_str(&hex::encode(slot));
    key
}

/// State adapter handed to the interpreter for one invocation.
///
/// Every write goes through to the stub and into an invocation local cache,
/// which is consulted before the stub on reads.
#[derive(Debug)]
pub struct StateManager<'a, S> {
    stub: &'a mut S,
    storage_cache: HashMap<String, B256>,
    account_cache: HashMap<Address, Option<StoredAccount>>,
    staged: HashMap<Address, AccountInfo>,
}

impl<'a, S: ChaincodeStub> StateManager<'a, S> {
    pub fn new(stub: &'a mut S) -> Self {
        Self {
            stub,
            storage_cache: HashMap::new(),
            account_cache: HashMap::new(),
            staged: HashMap::new(),
        }
    }

    pub fn stub(&mut self) -> &mut S {
        self.stub
    }

    pub fn get_account(&self, address: &Address) -> Result<Option<StoredAccount>, StateError> {
        if let Some(cached) = self.account_cache.get(address) {
            return Ok(cached.clone());
        }
        let key = account_key(address);
        self.stub
            .get_state(&key)?
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| StoredAccount::decode(&key, &bytes))
            .transpose()
    }

    pub fn update_account(
        &mut self,
        address: Address,
        account: StoredAccount,
    ) -> Result<(), StateError> {
        self.stub.put_state(&account_key(&address), account.encode()?)?;
        self.account_cache.insert(address, Some(account));
        Ok(())
    }

    pub fn remove_account(&mut self, address: Address) -> Result<(), StateError> {
        self.stub.del_state(&account_key(&address))?;
        self.account_cache.insert(address, None);
        Ok(())
    }

    /// Missing slots read as zero.
    pub fn get_storage(&self, address: &Address, slot: &B256) -> Result<B256, StateError> {
        let key = storage_key(address, slot);
        if let Some(value) = self.storage_cache.get(&key) {
            return Ok(*value);
        }
        match self.stub.get_state(&key)? {
            None => Ok(B256::ZERO),
            Some(bytes) if bytes.is_empty() => Ok(B256::ZERO),
            Some(bytes) => {
                B256::try_from(bytes.as_slice()).map_err(|_| {
                    StateError::MalformedSlot {
                        key,
                        len: bytes.len(),
                    }
                })
            }
        }
    }

    /// Writing zero deletes the slot.
    pub fn set_storage(
        &mut self,
        address: &Address,
        slot: &B256,
        value: B256,
    ) -> Result<(), StateError> {
        let key = storage_key(address, slot);
        if value.is_zero() {
            self.stub.del_state(&key)?;
        } else {
            self.stub.put_state(&key, value.to_vec())?;
        }
        self.storage_cache.insert(key, value);
        Ok(())
    }

    /// Makes `info` visible to the interpreter at `address` without writing
    /// it to the ledger. Used to place init code at a new contract address.
    pub fn stage_account(&mut self, address: Address, info: AccountInfo) {
        self.staged.insert(address, info);
    }

    /// Writes the outcome of a successful execution.
    pub fn apply(&mut self, changes: EvmState) -> Result<(), StateError> {
        for (address, account) in changes {
            if !account.is_touched() {
                continue;
            }
            if account.is_selfdestructed() {
                trace!(target: "evmcc::state", %address, "removing self destructed account");
                self.remove_account(address)?;
                continue;
            }

            let code = account
                .info
                .code
                .as_ref()
                .map(|code| code.original_bytes())
                .unwrap_or_default();
            if code.is_empty() {
                continue;
            }

            let stored = StoredAccount {
                nonce: account.info.nonce,
                code: code.to_vec(),
            };
            if self.get_account(&address)?.as_ref() != Some(&stored) {
                self.update_account(address, stored)?;
            }

            for (slot, value) in account.storage.iter().filter(|(_, v)| v.is_changed()) {
                self.set_storage(
                    &address,
                    &B256::from(*slot),
                    B256::from(value.present_value()),
                )?;
            }
        }
        Ok(())
    }
}

impl<S: ChaincodeStub> Database for StateManager<'_, S> {
    type Error = StateError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        if let Some(info) = self.staged.get(&address) {
            return Ok(Some(info.clone()));
        }
        Ok(self.get_account(&address)?.map(StoredAccount::into_info))
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        // Accounts are always loaded together with their code.
        if code_hash == KECCAK_EMPTY {
            return Ok(Bytecode::default());
        }
        Err(StateError::UnknownCodeHash(code_hash))
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let value = self.get_storage(&address, &B256::from(index))?;
        Ok(value.into())
    }

    fn block_hash(&mut self, _number: u64) -> Result<B256, Self::Error> {
        Ok(B256::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::MemoryStub;
    use revm::primitives::address;

    const CONTRACT: Address = address!("0x00000000000000000000000000000000000000aa");

    fn slot(n: u8) -> B256 {
        B256::with_last_byte(n)
    }

    #[test]
    fn composite_key_is_lowercase_hex() {
        let key = storage_key(&CONTRACT, &slot(1));
        assert_eq!(key.len(), 104);
        assert_eq!(
            key,
            format!("{}{}", "00000000000000000000000000000000000000aa", hex::encode(slot(1)))
        );
    }

    #[test]
    fn unwritten_slot_reads_zero() {
        let mut stub = MemoryStub::new("evmcc");
        let state = StateManager::new(&mut stub);
        assert_eq!(state.get_storage(&CONTRACT, &slot(7)).unwrap(), B256::ZERO);
    }

    #[test]
    fn reads_observe_writes_of_the_same_invocation() {
        let mut stub = MemoryStub::new("evmcc");
        let mut state = StateManager::new(&mut stub);
        let value = B256::with_last_byte(0x2a);

        state.set_storage(&CONTRACT, &slot(0), value).unwrap();
        assert_eq!(state.get_storage(&CONTRACT, &slot(0)).unwrap(), value);
        // The stub itself only serves committed state.
        assert_eq!(
            stub.get_state(&storage_key(&CONTRACT, &slot(0))).unwrap(),
            None
        );
    }

    #[test]
    fn zero_write_deletes_the_key() {
        let mut stub = MemoryStub::new("evmcc");
        let key = storage_key(&CONTRACT, &slot(0));
        {
            let mut state = StateManager::new(&mut stub);
            state
                .set_storage(&CONTRACT, &slot(0), B256::with_last_byte(1))
                .unwrap();
        }
        stub.commit();

        let mut state = StateManager::new(&mut stub);
        state.set_storage(&CONTRACT, &slot(0), B256::ZERO).unwrap();
        assert_eq!(state.get_storage(&CONTRACT, &slot(0)).unwrap(), B256::ZERO);
        assert_eq!(stub.write_set().get(&key), Some(&None));
    }

    #[test]
    fn account_round_trips_through_the_stub() {
        let mut stub = MemoryStub::new("evmcc");
        let account = StoredAccount {
            nonce: 1,
            code: vec![0x60, 0x00],
        };
        {
            let mut state = StateManager::new(&mut stub);
            state.update_account(CONTRACT, account.clone()).unwrap();
            assert_eq!(state.get_account(&CONTRACT).unwrap(), Some(account.clone()));
        }
        stub.commit();

        let mut state = StateManager::new(&mut stub);
        let info = state.basic(CONTRACT).unwrap().unwrap();
        assert_eq!(info.nonce, 1);
        assert_eq!(info.code_hash, keccak256([0x60, 0x00]));
        assert!(state.basic(Address::ZERO).unwrap().is_none());

        state.remove_account(CONTRACT).unwrap();
        assert_eq!(state.get_account(&CONTRACT).unwrap(), None);
    }

    #[test]
    fn malformed_slot_value_is_an_error() {
        let mut stub = MemoryStub::new("evmcc");
        stub.put_state(&storage_key(&CONTRACT, &slot(0)), vec![1, 2, 3])
            .unwrap();
        stub.commit();

        let state = StateManager::new(&mut stub);
        assert!(matches!(
            state.get_storage(&CONTRACT, &slot(0)),
            Err(StateError::MalformedSlot { len: 3, .. })
        ));
    }

    #[test]
    fn staged_account_shadows_the_ledger() {
        let mut stub = MemoryStub::new("evmcc");
        let mut state = StateManager::new(&mut stub);
        state.stage_account(
            CONTRACT,
            AccountInfo {
                nonce: 1,
                ..Default::default()
            },
        );
        assert_eq!(state.basic(CONTRACT).unwrap().unwrap().nonce, 1);
        assert!(state.get_account(&CONTRACT).unwrap().is_none());
    }
}
