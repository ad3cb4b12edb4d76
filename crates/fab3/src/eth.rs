//! The `eth` namespace: reshapes ledger artifacts into Ethereum JSON-RPC
//! results.
//!
//! Block hashes published by the gateway are the ledger `data_hash` of the
//! block. Transaction hashes are ledger transaction ids.

use evmcc::LogEntry;
use fabric_protos::{
    ChaincodeActionView,
    EnvelopeView,
    block_transactions,
    find_transaction,
    identity_to_address,
    messages::{
        Block,
        BlockHeader,
    },
};
use serde_json::Value;
use tracing::debug;

use crate::{
    client::{
        ChannelRequest,
        SharedChannelClient,
        SharedLedgerClient,
    },
    error::{
        Fab3Error,
        Result,
    },
    filters::{
        FilterKind,
        FilterRegistry,
    },
    types::{
        Block as EthBlock,
        BlockTransactions,
        EthArgs,
        FilterChanges,
        GetLogsArgs,
        Log,
        TopicFilter,
        Transaction,
        TxReceipt,
        ZERO_QUANTITY,
        quantity,
        strip_0x,
    },
};

/// Hex of the 20 byte zero address, the callee of a contract deployment.
pub const ZERO_ADDRESS: &str = "0000000000000000000000000000000000000000";

const LATEST: &str = "latest";

/// A block reference as accepted by block taking methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Latest,
    Earliest,
    Number(u64),
}

impl BlockRef {
    /// Parses `latest`, `earliest` or a base 16 number with optional `0x`.
    /// `pending` is rejected, the ledger does not expose in-progress blocks.
    pub fn parse(value: &str) -> Result<Self> {
        match strip_0x(value) {
            "latest" => Ok(Self::Latest),
            "earliest" => Ok(Self::Earliest),
            "pending" => Err(Fab3Error::UnknownBlockTag("pending".into())),
            number => {
                u64::from_str_radix(number, 16).map(Self::Number).map_err(|e| {
                    Fab3Error::malformed(format!("failed to parse block number {value:?}: {e}"))
                })
            }
        }
    }

    fn resolve_against(self, latest: u64) -> u64 {
        match self {
            Self::Latest => latest,
            Self::Earliest => 0,
            Self::Number(number) => number,
        }
    }
}

/// EVM level view of an endorser transaction.
#[derive(Debug, Default)]
struct TransactionDetails {
    /// Callee hex as invoked, without prefix. Empty for non EVM shapes.
    to: String,
    input: String,
    /// `0x` prefixed creator address. Empty for non EVM shapes.
    from: String,
    action: ChaincodeActionView,
}

impl TransactionDetails {
    fn from_envelope(envelope: &EnvelopeView) -> Result<Self> {
        let action = envelope.chaincode_action()?;
        let (to, input) = match action.args.as_slice() {
            [function, _] if function.as_slice() == b"getCode" => return Ok(Self::bare(action)),
            [to, input] => {
                (
                    String::from_utf8_lossy(to).into_owned(),
                    String::from_utf8_lossy(input).into_owned(),
                )
            }
            _ => return Ok(Self::bare(action)),
        };
        let from = identity_to_address(&envelope.creator()?)?;

        Ok(Self {
            to,
            input,
            from: format!("{from:#x}"),
            action,
        })
    }

    fn bare(action: ChaincodeActionView) -> Self {
        Self {
            action,
            ..Default::default()
        }
    }
}

/// Block and transaction coordinates stamped on every log.
#[derive(Debug)]
struct LogContext {
    block_number: String,
    block_hash: String,
    transaction_hash: String,
    transaction_index: String,
}

/// Serves the `eth` namespace over the ledger client seams.
#[derive(Clone)]
pub struct EthService {
    channel: SharedChannelClient,
    ledger: SharedLedgerClient,
    chaincode_id: String,
    filters: FilterRegistry,
}

impl EthService {
    pub fn new(
        channel: SharedChannelClient,
        ledger: SharedLedgerClient,
        chaincode_id: impl Into<String>,
        filters: FilterRegistry,
    ) -> Self {
        Self {
            channel,
            ledger,
            chaincode_id: chaincode_id.into(),
            filters,
        }
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    fn request(&self, function: &str) -> ChannelRequest {
        ChannelRequest::new(self.chaincode_id.as_str(), function)
    }

    /// Hex runtime code at `address` as returned by the chaincode.
    pub async fn get_code(&self, address: &str) -> Result<String> {
        let response = self
            .channel
            .query(self.request("getCode").arg(strip_0x(address)))
            .await?;
        Ok(String::from_utf8_lossy(&response.payload).into_owned())
    }

    pub async fn call(&self, args: &EthArgs) -> Result<String> {
        let response = self
            .channel
            .query(self.request(strip_0x(&args.to)).arg(strip_0x(&args.data)))
            .await?;
        Ok(format!("0x{}", hex::encode(response.payload)))
    }

    /// Executes the transaction and returns the ledger transaction id. An
    /// empty `to` deploys `data`.
    pub async fn send_transaction(&self, args: &EthArgs) -> Result<String> {
        let to = match strip_0x(&args.to) {
            "" => ZERO_ADDRESS,
            to => to,
        };
        let response = self
            .channel
            .execute(self.request(to).arg(strip_0x(&args.data)))
            .await?;
        debug!(target: "fab3::eth", tx_id = %response.tx_id, "transaction committed");
        Ok(response.tx_id)
    }

    pub async fn get_transaction_receipt(&self, tx_id: &str) -> Result<TxReceipt> {
        let tx_id = strip_0x(tx_id);
        let processed = self.ledger.query_transaction(tx_id).await?;
        let envelope = EnvelopeView::decode(&processed.envelope)?;
        let details = TransactionDetails::from_envelope(&envelope)?;
        let block = self.ledger.query_block_by_tx_id(tx_id).await?;
        let header = block_header(&block)?;
        let (index, _) = locate(&block, header, tx_id)?;

        let mut receipt = TxReceipt {
            transaction_hash: format!("0x{tx_id}"),
            transaction_index: quantity(index as u64),
            block_hash: block_hash(header),
            block_number: quantity(header.number),
            contract_address: None,
            gas_used: ZERO_QUANTITY.into(),
            cumulative_gas_used: ZERO_QUANTITY.into(),
            to: String::new(),
            logs: Vec::new(),
            // The ledger marks valid transactions with 0, Ethereum with 1.
            status: if processed.is_valid() {
                "0x1".into()
            } else {
                "0x0".into()
            },
            from: details.from.clone(),
        };

        if !details.to.is_empty() {
            let callee = hex::decode(strip_0x(&details.to)).map_err(|e| {
                Fab3Error::DecodeFailure(format!("failed to decode to address: {e}"))
            })?;
            if callee.iter().all(|b| *b == 0) {
                receipt.contract_address = Some(format!(
                    "0x{}",
                    String::from_utf8_lossy(details.action.response_payload())
                ));
            } else {
                receipt.to = format!("0x{}", strip_0x(&details.to));
            }
        }

        let context = LogContext {
            block_number: receipt.block_number.clone(),
            block_hash: receipt.block_hash.clone(),
            transaction_hash: receipt.transaction_hash.clone(),
            transaction_index: receipt.transaction_index.clone(),
        };
        receipt.logs = event_logs(&details.action, &context, &[], &[])?;
        Ok(receipt)
    }

    pub async fn accounts(&self) -> Result<Vec<String>> {
        let response = self.channel.query(self.request("account")).await?;
        Ok(vec![format!(
            "0x{}",
            String::from_utf8_lossy(&response.payload).to_lowercase()
        )])
    }

    /// Transactions run with a fixed budget, so the estimate is always zero.
    pub fn estimate_gas(&self) -> String {
        ZERO_QUANTITY.into()
    }

    /// Balances are not tracked.
    pub fn get_balance(&self) -> String {
        ZERO_QUANTITY.into()
    }

    pub fn get_transaction_count(&self) -> String {
        ZERO_QUANTITY.into()
    }

    pub async fn block_number(&self) -> Result<String> {
        Ok(quantity(self.latest_block().await?))
    }

    /// `params` are `[number_or_tag, full_transactions]`.
    pub async fn get_block_by_number(&self, params: &[Value]) -> Result<EthBlock> {
        let [number, full] = params else {
            return Err(Fab3Error::malformed(format!(
                "need 2 params, got {}",
                params.len()
            )));
        };
        let number = number
            .as_str()
            .ok_or_else(|| Fab3Error::malformed("incorrect first parameter sent, must be string"))?;
        let full = full
            .as_bool()
            .ok_or_else(|| Fab3Error::malformed("incorrect second parameter sent, must be boolean"))?;

        let number = self.resolve_block(BlockRef::parse(number)?).await?;
        let block = self.ledger.query_block(number).await?;
        let header = block_header(&block)?;
        let hash = block_hash(header);
        let block_number = quantity(header.number);

        let mut hashes = Vec::new();
        let mut transactions = Vec::new();
        for transaction in block_transactions(&block) {
            if !transaction.is_valid() {
                continue;
            }
            let Some(envelope) = transaction.envelope else {
                continue;
            };
            let envelope = envelope?;
            let tx_hash = format!("0x{}", envelope.tx_id());

            if !full {
                hashes.push(tx_hash);
                continue;
            }
            let details = if envelope.is_endorser_transaction() {
                TransactionDetails::from_envelope(&envelope)?
            } else {
                TransactionDetails::default()
            };
            transactions.push(eth_transaction(
                &details,
                hash.clone(),
                block_number.clone(),
                transaction.index,
                tx_hash,
            ));
        }

        Ok(EthBlock {
            number: block_number,
            hash,
            parent_hash: format!("0x{}", hex::encode(&header.previous_hash)),
            gas_limit: ZERO_QUANTITY.into(),
            transactions: if full {
                BlockTransactions::Full(transactions)
            } else {
                BlockTransactions::Hashes(hashes)
            },
        })
    }

    pub async fn get_transaction_by_hash(&self, tx_id: &str) -> Result<Transaction> {
        let tx_id = strip_0x(tx_id);
        if tx_id.is_empty() {
            return Err(Fab3Error::malformed("txID was empty"));
        }
        let block = self.ledger.query_block_by_tx_id(tx_id).await?;
        let header = block_header(&block)?;
        let (index, envelope) = locate(&block, header, tx_id)?;
        let details = TransactionDetails::from_envelope(&envelope)?;

        Ok(eth_transaction(
            &details,
            block_hash(header),
            quantity(header.number),
            index,
            format!("0x{tx_id}"),
        ))
    }

    pub async fn get_logs(&self, args: &GetLogsArgs) -> Result<Vec<Log>> {
        let (from, to) = self.log_range(args).await?;
        debug!(target: "fab3::eth", from, to, "checking blocks for logs");
        self.logs_in_range(from, to, args).await
    }

    pub async fn new_filter(&self, args: GetLogsArgs) -> Result<String> {
        let latest = self.latest_block().await?;
        Ok(self.filters.install(FilterKind::Logs(args), latest))
    }

    pub async fn new_block_filter(&self) -> Result<String> {
        let latest = self.latest_block().await?;
        Ok(self.filters.install(FilterKind::NewBlocks, latest))
    }

    pub fn uninstall_filter(&self, id: &str) -> Result<bool> {
        self.filters.uninstall(id)
    }

    /// Reports what happened since the previous poll of filter `id`.
    pub async fn get_filter_changes(&self, id: &str) -> Result<FilterChanges> {
        let entry = self.filters.get(id)?;
        let mut filter = entry.lock().await;
        let latest = self.latest_block().await?;
        debug!(
            target: "fab3::eth",
            filter_id = id,
            last_block_seen = filter.last_block_seen,
            latest,
            "polling filter"
        );

        let changes = match filter.kind.clone() {
            FilterKind::NewBlocks => {
                let mut hashes = Vec::new();
                for number in (filter.last_block_seen + 1..=latest).rev() {
                    let block = self.ledger.query_block(number).await?;
                    hashes.push(block_hash(block_header(&block)?));
                }
                FilterChanges::Blocks(hashes)
            }
            FilterKind::Logs(args) if !args.block_hash.is_empty() => {
                if filter.exhausted {
                    FilterChanges::Logs(Vec::new())
                } else {
                    let logs = self.get_logs(&args).await?;
                    filter.exhausted = true;
                    FilterChanges::Logs(logs)
                }
            }
            FilterKind::Logs(args) => {
                let from = BlockRef::parse(or_latest(&args.from_block))?
                    .resolve_against(latest)
                    .max(filter.last_block_seen + 1);
                let to = BlockRef::parse(or_latest(&args.to_block))?
                    .resolve_against(latest)
                    .min(latest);
                if from > to {
                    FilterChanges::Logs(Vec::new())
                } else {
                    FilterChanges::Logs(self.logs_in_range(from, to, &args).await?)
                }
            }
        };

        filter.last_block_seen = latest;
        Ok(changes)
    }

    async fn latest_block(&self) -> Result<u64> {
        let info = self.ledger.query_info().await?;
        info.height
            .checked_sub(1)
            .ok_or_else(|| Fab3Error::LedgerUnavailable("the ledger has no blocks".into()))
    }

    async fn resolve_block(&self, block: BlockRef) -> Result<u64> {
        match block {
            BlockRef::Latest => self.latest_block().await,
            other => Ok(other.resolve_against(0)),
        }
    }

    async fn log_range(&self, args: &GetLogsArgs) -> Result<(u64, u64)> {
        if !args.block_hash.is_empty() {
            let hash = hex::decode(&args.block_hash).map_err(|e| {
                Fab3Error::malformed(format!("failed to parse the block hash: {e}"))
            })?;
            let block = self.ledger.query_block_by_hash(&hash).await?;
            let number = block_header(&block)?.number;
            return Ok((number, number));
        }

        let from_tag = or_latest(&args.from_block);
        let to_tag = or_latest(&args.to_block);
        let from = self.resolve_block(BlockRef::parse(from_tag)?).await?;
        let to = if from_tag == to_tag {
            from
        } else {
            self.resolve_block(BlockRef::parse(to_tag)?).await?
        };
        if from > to {
            return Err(Fab3Error::malformed(
                "fromBlock number greater than toBlock number",
            ));
        }
        Ok((from, to))
    }

    async fn logs_in_range(&self, from: u64, to: u64, args: &GetLogsArgs) -> Result<Vec<Log>> {
        let mut logs = Vec::new();
        for number in from..=to {
            let block = self.ledger.query_block(number).await?;
            logs.extend(block_logs(&block, &args.address, &args.topics)?);
        }
        Ok(logs)
    }
}

fn or_latest(tag: &str) -> &str {
    if tag.is_empty() { LATEST } else { tag }
}

fn block_header(block: &Block) -> Result<&BlockHeader> {
    block
        .header
        .as_ref()
        .ok_or_else(|| Fab3Error::DecodeFailure("block has no header".into()))
}

fn block_hash(header: &BlockHeader) -> String {
    format!("0x{}", hex::encode(&header.data_hash))
}

fn locate(block: &Block, header: &BlockHeader, tx_id: &str) -> Result<(usize, EnvelopeView)> {
    find_transaction(block, tx_id)?.ok_or_else(|| {
        Fab3Error::DecodeFailure(format!(
            "transaction {tx_id} not found in block {}",
            header.number
        ))
    })
}

fn eth_transaction(
    details: &TransactionDetails,
    block_hash: String,
    block_number: String,
    index: usize,
    hash: String,
) -> Transaction {
    let prefixed = |value: &str| {
        if value.is_empty() {
            String::new()
        } else {
            format!("0x{}", strip_0x(value))
        }
    };
    Transaction {
        block_hash,
        block_number,
        to: prefixed(&details.to),
        from: details.from.clone(),
        input: prefixed(&details.input),
        transaction_index: quantity(index as u64),
        hash,
        gas_price: ZERO_QUANTITY.into(),
        value: ZERO_QUANTITY.into(),
    }
}

/// Logs of every valid endorser transaction in `block` passing the filters.
fn block_logs(block: &Block, address: &[String], topics: &[TopicFilter]) -> Result<Vec<Log>> {
    let header = block_header(block)?;
    let block_hash = block_hash(header);
    let block_number = quantity(header.number);

    let mut logs = Vec::new();
    for transaction in block_transactions(block) {
        if !transaction.is_valid() {
            continue;
        }
        let Some(envelope) = transaction.envelope else {
            continue;
        };
        let envelope = envelope?;
        if !envelope.is_endorser_transaction() {
            debug!(target: "fab3::eth", block_number = header.number, index = transaction.index, "skipping non endorser transaction");
            continue;
        }

        let action = envelope.chaincode_action()?;
        let context = LogContext {
            block_number: block_number.clone(),
            block_hash: block_hash.clone(),
            transaction_hash: format!("0x{}", envelope.tx_id()),
            transaction_index: quantity(transaction.index as u64),
        };
        logs.extend(event_logs(&action, &context, address, topics)?);
    }
    Ok(logs)
}

/// Lifts the logs carried by the chaincode event of one transaction.
/// `log_index` is the position of the log within its transaction.
fn event_logs(
    action: &ChaincodeActionView,
    context: &LogContext,
    address: &[String],
    topics: &[TopicFilter],
) -> Result<Vec<Log>> {
    let Some(event) = action.event()? else {
        return Ok(Vec::new());
    };
    let entries: Vec<LogEntry> = serde_json::from_slice(&event.payload).map_err(|e| {
        Fab3Error::DecodeFailure(format!("failed to unmarshal chaincode event payload: {e}"))
    })?;

    Ok(entries
        .into_iter()
        .enumerate()
        .filter(|(_, entry)| log_matches(entry, address, topics))
        .map(|(index, entry)| {
            Log {
                address: format!("0x{}", entry.address),
                topics: entry.topics.iter().map(|t| format!("0x{t}")).collect(),
                data: (!entry.data.is_empty()).then(|| format!("0x{}", entry.data)),
                block_number: context.block_number.clone(),
                transaction_hash: context.transaction_hash.clone(),
                transaction_index: context.transaction_index.clone(),
                block_hash: context.block_hash.clone(),
                log_index: quantity(index as u64),
            }
        })
        .collect())
}

/// Address filters are OR'd. Topic groups are AND'd by position, entries of
/// a group OR'd, and an empty group or empty entry matches anything.
pub fn log_matches(entry: &LogEntry, address: &[String], topics: &[TopicFilter]) -> bool {
    if !address.is_empty() && !address.contains(&entry.address) {
        return false;
    }
    if topics.len() > entry.topics.len() {
        return false;
    }
    topics.iter().zip(&entry.topics).all(|(group, topic)| {
        group.is_empty() || group.iter().any(|t| t.is_empty() || t == topic)
    })
}
