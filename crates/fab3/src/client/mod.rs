//! Seams towards the ledger network.
//!
//! [`ChannelClient`] runs chaincode invocations, [`LedgerClient`] reads
//! committed blocks. The gateway only depends on these traits.

use std::sync::Arc;

use async_trait::async_trait;
use fabric_protos::{
    block::{
        TX_INVALID_OTHER_REASON,
        TX_VALID,
        TxValidationFlags,
    },
    find_transaction,
    messages::Block,
};

use crate::error::Result;

pub mod memory;

pub use memory::InProcessLedger;

/// One chaincode invocation. The chaincode receives `[function, args..]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRequest {
    pub chaincode_id: String,
    pub function: String,
    pub args: Vec<Vec<u8>>,
}

impl ChannelRequest {
    pub fn new(chaincode_id: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
            function: function.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<Vec<u8>>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Arguments as the chaincode sees them.
    pub fn chaincode_args(&self) -> Vec<Vec<u8>> {
        std::iter::once(self.function.clone().into_bytes())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelResponse {
    pub payload: Vec<u8>,
    pub tx_id: String,
}

/// Chain summary. Only the height is read, block hashes are taken from the
/// blocks themselves since the gateway publishes data hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockchainInfo {
    /// Number of committed blocks, genesis included.
    pub height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedTransaction {
    /// Encoded envelope.
    pub envelope: Vec<u8>,
    pub validation_code: i32,
}

impl ProcessedTransaction {
    /// Picks `tx_id` and its validation code out of a committed block. A
    /// transaction without a recorded code counts as invalid.
    pub fn from_block(block: &Block, tx_id: &str) -> Result<Option<Self>> {
        let Some((index, _)) = find_transaction(block, tx_id)? else {
            return Ok(None);
        };
        let envelope = block
            .data
            .as_ref()
            .and_then(|d| d.data.get(index))
            .cloned()
            .unwrap_or_default();
        let validation_code = TxValidationFlags::from_block(block)
            .flag(index)
            .unwrap_or(TX_INVALID_OTHER_REASON);
        Ok(Some(Self {
            envelope,
            validation_code: i32::from(validation_code),
        }))
    }

    pub fn is_valid(&self) -> bool {
        self.validation_code == i32::from(TX_VALID)
    }
}

#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Simulates the invocation without committing it.
    async fn query(&self, request: ChannelRequest) -> Result<ChannelResponse>;
    /// Submits the invocation and waits until its block is committed.
    async fn execute(&self, request: ChannelRequest) -> Result<ChannelResponse>;
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn query_info(&self) -> Result<BlockchainInfo>;
    async fn query_block(&self, number: u64) -> Result<Block>;
    async fn query_block_by_tx_id(&self, tx_id: &str) -> Result<Block>;
    async fn query_block_by_hash(&self, hash: &[u8]) -> Result<Block>;
    async fn query_transaction(&self, tx_id: &str) -> Result<ProcessedTransaction>;
}

pub type SharedChannelClient = Arc<dyn ChannelClient>;
pub type SharedLedgerClient = Arc<dyn LedgerClient>;
