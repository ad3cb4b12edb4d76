use revm::primitives::Log;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::StubError,
    stub::ChaincodeStub,
};

/// One EVM log as carried in the chaincode event payload. All fields are
/// lowercase hex without a `0x` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

impl From<&Log> for LogEntry {
    fn from(log: &Log) -> Self {
        Self {
            address: hex::encode(log.address),
            topics: log.topics().iter().map(hex::encode).collect(),
            data: hex::encode(&log.data.data),
        }
    }
}

/// Collects the logs of one invocation and emits them as a single ledger
/// event.
#[derive(Debug, Default)]
pub struct EventManager {
    entries: Vec<LogEntry>,
}

impl EventManager {
    pub fn log(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emits the buffered entries as a JSON array under `name`. Nothing is
    /// emitted when the buffer is empty.
    pub fn flush<S: ChaincodeStub>(&mut self, stub: &mut S, name: &str) -> Result<(), StubError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_vec(&self.entries)
            .map_err(|e| StubError::Backend(format!("failed to marshal events: {e}")))?;
        stub.set_event(name, payload)?;
        self.entries.clear();
        Ok(())
    }
}
