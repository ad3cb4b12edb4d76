//! A single channel ledger hosting the EVM chaincode in process.
//!
//! Every `execute` cuts its own block. Blocks carry real envelopes so the
//! gateway decodes them exactly like blocks read from a peer.

use std::collections::HashMap;

use async_trait::async_trait;
use evmcc::{
    EvmChaincode,
    MemoryStub,
};
use fabric_protos::{
    block::{
        TX_ENDORSEMENT_POLICY_FAILURE,
        TX_VALID,
        header_hash,
    },
    builder::{
        EndorserTransaction,
        block_with_transactions,
        compute_tx_id,
        config_envelope,
    },
    messages::{
        Block,
        Response,
    },
};
use parking_lot::Mutex;
use prost::Message;
use tracing::{
    debug,
    info,
};

use super::{
    BlockchainInfo,
    ChannelClient,
    ChannelRequest,
    ChannelResponse,
    LedgerClient,
    ProcessedTransaction,
};
use crate::error::{
    Fab3Error,
    Result,
};

const NONCE_LEN: usize = 24;

#[derive(Debug)]
struct LedgerState {
    stub: MemoryStub,
    blocks: Vec<Block>,
    by_tx_id: HashMap<String, u64>,
    by_hash: HashMap<Vec<u8>, u64>,
}

/// In-memory ledger implementing both client seams for one channel.
#[derive(Debug)]
pub struct InProcessLedger {
    channel_id: String,
    chaincode_id: String,
    creator: Vec<u8>,
    chaincode: EvmChaincode,
    state: Mutex<LedgerState>,
}

impl InProcessLedger {
    /// Creates the ledger with its genesis block. `creator` is the serialized
    /// identity submitting every transaction.
    pub fn new(
        channel_id: impl Into<String>,
        chaincode_id: impl Into<String>,
        creator: Vec<u8>,
    ) -> Result<Self> {
        let channel_id = channel_id.into();
        let chaincode_id = chaincode_id.into();

        let mut state = LedgerState {
            stub: MemoryStub::new(chaincode_id.clone()),
            blocks: Vec::new(),
            by_tx_id: HashMap::new(),
            by_hash: HashMap::new(),
        };
        let tx_id = compute_tx_id(&new_nonce(), &creator);
        let genesis = config_envelope(&channel_id, &tx_id).encode_to_vec();
        state.append(tx_id, genesis, TX_VALID)?;
        info!(target: "fab3::ledger", %channel_id, %chaincode_id, "created in-process ledger");

        Ok(Self {
            channel_id,
            chaincode_id,
            creator,
            chaincode: EvmChaincode,
            state: Mutex::new(state),
        })
    }

    fn check_chaincode(&self, request: &ChannelRequest) -> Result<()> {
        if request.chaincode_id != self.chaincode_id {
            return Err(Fab3Error::LedgerUnavailable(format!(
                "chaincode {} is not installed on channel {}",
                request.chaincode_id, self.channel_id
            )));
        }
        Ok(())
    }

    /// Runs the chaincode against the current world state. The writes stay
    /// pending in the stub until the caller commits or rolls back.
    fn simulate(&self, stub: &mut MemoryStub, tx_id: &str, args: Vec<Vec<u8>>) -> Response {
        stub.begin(tx_id, self.creator.clone(), args);
        self.chaincode.invoke(stub)
    }
}

impl LedgerState {
    fn append(&mut self, tx_id: String, envelope: Vec<u8>, validation_code: u8) -> Result<u64> {
        let number = self.blocks.len() as u64;
        let previous_hash = match self.blocks.last().and_then(|b| b.header.as_ref()) {
            Some(header) => header_hash(header)?,
            None => Vec::new(),
        };
        let block = block_with_transactions(
            number,
            previous_hash,
            vec![envelope],
            vec![validation_code],
        );
        let data_hash = block
            .header
            .as_ref()
            .map(|h| h.data_hash.clone())
            .unwrap_or_default();

        self.blocks.push(block);
        self.by_tx_id.insert(tx_id, number);
        self.by_hash.insert(data_hash, number);
        Ok(number)
    }

    fn block(&self, number: u64) -> Result<Block> {
        usize::try_from(number)
            .ok()
            .and_then(|n| self.blocks.get(n))
            .cloned()
            .ok_or_else(|| Fab3Error::LedgerUnavailable(format!("block {number} not found")))
    }

    fn block_of(&self, tx_id: &str) -> Result<Block> {
        let number = self.by_tx_id.get(tx_id).copied().ok_or_else(|| {
            Fab3Error::LedgerUnavailable(format!("transaction {tx_id} not found"))
        })?;
        self.block(number)
    }
}

fn new_nonce() -> [u8; NONCE_LEN] {
    rand::random()
}

#[async_trait]
impl ChannelClient for InProcessLedger {
    async fn query(&self, request: ChannelRequest) -> Result<ChannelResponse> {
        self.check_chaincode(&request)?;
        let tx_id = compute_tx_id(&new_nonce(), &self.creator);

        let mut state = self.state.lock();
        let response = self.simulate(&mut state.stub, &tx_id, request.chaincode_args());
        state.stub.rollback();
        debug!(target: "fab3::ledger", %tx_id, function = %request.function, status = response.status, "query");

        if !response.is_success() {
            return Err(Fab3Error::EvmExecution(response.message));
        }
        Ok(ChannelResponse {
            payload: response.payload,
            tx_id,
        })
    }

    async fn execute(&self, request: ChannelRequest) -> Result<ChannelResponse> {
        self.check_chaincode(&request)?;
        let nonce = new_nonce();
        let tx_id = compute_tx_id(&nonce, &self.creator);
        let args = request.chaincode_args();

        let mut state = self.state.lock();
        let response = self.simulate(&mut state.stub, &tx_id, args.clone());
        // The stub drops the event on commit.
        let events = state
            .stub
            .event()
            .map(|event| event.encode_to_vec())
            .unwrap_or_default();
        let validation_code = if response.is_success() {
            state.stub.commit();
            TX_VALID
        } else {
            state.stub.rollback();
            TX_ENDORSEMENT_POLICY_FAILURE
        };

        let envelope = EndorserTransaction {
            channel_id: self.channel_id.clone(),
            tx_id: tx_id.clone(),
            creator: self.creator.clone(),
            nonce: nonce.to_vec(),
            chaincode_id: self.chaincode_id.clone(),
            args,
            response: response.clone(),
            events,
        }
        .to_envelope()
        .encode_to_vec();
        let number = state.append(tx_id.clone(), envelope, validation_code)?;
        debug!(
            target: "fab3::ledger",
            %tx_id,
            block_number = number,
            validation_code,
            "committed transaction"
        );

        if !response.is_success() {
            return Err(Fab3Error::EvmExecution(response.message));
        }
        Ok(ChannelResponse {
            payload: response.payload,
            tx_id,
        })
    }
}

#[async_trait]
impl LedgerClient for InProcessLedger {
    async fn query_info(&self) -> Result<BlockchainInfo> {
        Ok(BlockchainInfo {
            height: self.state.lock().blocks.len() as u64,
        })
    }

    async fn query_block(&self, number: u64) -> Result<Block> {
        self.state.lock().block(number)
    }

    async fn query_block_by_tx_id(&self, tx_id: &str) -> Result<Block> {
        self.state.lock().block_of(tx_id)
    }

    async fn query_block_by_hash(&self, hash: &[u8]) -> Result<Block> {
        let state = self.state.lock();
        let number = state.by_hash.get(hash).copied().ok_or_else(|| {
            Fab3Error::LedgerUnavailable(format!("block with hash {} not found", hex::encode(hash)))
        })?;
        state.block(number)
    }

    async fn query_transaction(&self, tx_id: &str) -> Result<ProcessedTransaction> {
        let block = self.state.lock().block_of(tx_id)?;
        ProcessedTransaction::from_block(&block, tx_id)?.ok_or_else(|| {
            Fab3Error::LedgerUnavailable(format!("transaction {tx_id} not found"))
        })
    }
}
