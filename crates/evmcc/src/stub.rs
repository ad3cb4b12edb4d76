//! The ledger's view of one chaincode invocation.

use std::collections::BTreeMap;

use fabric_protos::messages::ChaincodeEvent;

use crate::error::StubError;

/// Access to the invocation arguments and the key-value world state of the
/// channel the chaincode runs on.
///
/// Writes are part of the transaction's write set. Whether a read observes a
/// write made earlier in the same invocation is backend specific, so callers
/// must not rely on it.
pub trait ChaincodeStub {
    fn args(&self) -> &[Vec<u8>];

    fn tx_id(&self) -> &str;

    /// Serialized identity of the transaction submitter.
    fn creator(&self) -> Result<Vec<u8>, StubError>;

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StubError>;

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), StubError>;

    fn del_state(&mut self, key: &str) -> Result<(), StubError>;

    /// Sets the single event of this invocation, replacing any earlier one.
    fn set_event(&mut self, name: &str, payload: Vec<u8>) -> Result<(), StubError>;
}

/// In-memory world state with a per-transaction write set.
///
/// Reads are served from committed state only, like an endorsing peer's
/// simulator. A transaction is started with [`MemoryStub::begin`] and ends
/// with [`MemoryStub::commit`] or [`MemoryStub::rollback`].
#[derive(Debug, Default)]
pub struct MemoryStub {
    committed: BTreeMap<String, Vec<u8>>,
    writes: BTreeMap<String, Option<Vec<u8>>>,
    tx_id: String,
    creator: Vec<u8>,
    args: Vec<Vec<u8>>,
    event: Option<ChaincodeEvent>,
    chaincode_id: String,
}

impl MemoryStub {
    pub fn new(chaincode_id: impl Into<String>) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
            ..Default::default()
        }
    }

    /// Starts a transaction, dropping any uncommitted writes and event.
    pub fn begin(&mut self, tx_id: impl Into<String>, creator: Vec<u8>, args: Vec<Vec<u8>>) {
        self.rollback();
        self.tx_id = tx_id.into();
        self.creator = creator;
        self.args = args;
    }

    /// Applies the write set to committed state.
    pub fn commit(&mut self) {
        for (key, value) in std::mem::take(&mut self.writes) {
            match value {
                Some(value) => self.committed.insert(key, value),
                None => self.committed.remove(&key),
            };
        }
        self.event = None;
    }

    pub fn rollback(&mut self) {
        self.writes.clear();
        self.event = None;
    }

    /// Event set by the current transaction.
    pub fn event(&self) -> Option<&ChaincodeEvent> {
        self.event.as_ref()
    }

    /// Pending writes of the current transaction. `None` marks a delete.
    pub fn write_set(&self) -> &BTreeMap<String, Option<Vec<u8>>> {
        &self.writes
    }

    pub fn committed(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.committed
    }
}

impl ChaincodeStub for MemoryStub {
    fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn creator(&self) -> Result<Vec<u8>, StubError> {
        Ok(self.creator.clone())
    }

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StubError> {
        if key.is_empty() {
            return Err(StubError::EmptyKey);
        }
        Ok(self.committed.get(key).cloned())
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), StubError> {
        if key.is_empty() {
            return Err(StubError::EmptyKey);
        }
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> Result<(), StubError> {
        if key.is_empty() {
            return Err(StubError::EmptyKey);
        }
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    fn set_event(&mut self, name: &str, payload: Vec<u8>) -> Result<(), StubError> {
        if name.is_empty() {
            return Err(StubError::EmptyEventName);
        }
        self.event = Some(ChaincodeEvent {
            chaincode_id: self.chaincode_id.clone(),
            tx_id: self.tx_id.clone(),
            event_name: name.to_string(),
            payload,
        });
        Ok(())
    }
}
