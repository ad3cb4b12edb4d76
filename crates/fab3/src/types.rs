//! Ethereum JSON-RPC request and response shapes.

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

use crate::error::Fab3Error;

const HEX_ADDRESS_LEN: usize = 40;
const HEX_TOPIC_LEN: usize = 64;

/// Quantity emitted for every gas and value field.
pub const ZERO_QUANTITY: &str = "0x0";

/// Removes an optional `0x` prefix. The rest of the string is not checked.
pub fn strip_0x(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

/// Formats a quantity as `0x` prefixed hex without leading zeros.
pub fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

/// Arguments of `eth_call`, `eth_sendTransaction` and `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EthArgs {
    pub to: String,
    pub from: String,
    pub gas: String,
    pub gas_price: String,
    pub value: String,
    pub data: String,
    pub nonce: String,
}

/// Lowercase 40 hex character addresses without prefix, OR'd together.
pub type AddressFilter = Vec<String>;

/// 64 hex character topics without prefix, OR'd together. An empty string
/// matches any topic.
pub type TopicFilter = Vec<String>;

/// Topic filters AND'd position by position.
pub type TopicsFilter = Vec<TopicFilter>;

/// Arguments of `eth_getLogs` and `eth_newFilter`.
///
/// Block references are kept as given (minus `0x`) and resolved when the
/// query runs. An empty string means the reference was not supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawGetLogsArgs")]
pub struct GetLogsArgs {
    pub from_block: String,
    pub to_block: String,
    pub address: AddressFilter,
    pub topics: TopicsFilter,
    pub block_hash: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawGetLogsArgs {
    from_block: Option<String>,
    to_block: Option<String>,
    address: Option<Value>,
    topics: Option<Value>,
    block_hash: Option<String>,
}

impl TryFrom<RawGetLogsArgs> for GetLogsArgs {
    type Error = Fab3Error;

    fn try_from(raw: RawGetLogsArgs) -> Result<Self, Self::Error> {
        let stripped = |value: Option<String>| {
            value
                .as_deref()
                .map(strip_0x)
                .unwrap_or_default()
                .to_string()
        };
        let from_block = stripped(raw.from_block);
        let to_block = stripped(raw.to_block);
        let block_hash = stripped(raw.block_hash);
        if !block_hash.is_empty() && (!from_block.is_empty() || !to_block.is_empty()) {
            return Err(Fab3Error::malformed(
                "cannot provide blockHash and (fromBlock or toBlock), they are exclusive options",
            ));
        }

        Ok(Self {
            from_block,
            to_block,
            address: raw.address.map(parse_address_filter).transpose()?.unwrap_or_default(),
            topics: raw.topics.map(parse_topics_filter).transpose()?.unwrap_or_default(),
            block_hash,
        })
    }
}

fn parse_address_filter(value: Value) -> Result<AddressFilter, Fab3Error> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(address) => Ok(vec![parse_address(&address)?]),
        Value::Array(addresses) => {
            addresses
                .iter()
                .enumerate()
                .filter_map(|(i, address)| address.as_str().map(|a| (i, a)))
                .map(|(i, address)| {
                    parse_address(address).map_err(|e| {
                        Fab3Error::malformed(format!("invalid address at position {i}: {e}"))
                    })
                })
                .collect()
        }
        _ => Err(Fab3Error::malformed("badly formatted address field")),
    }
}

fn parse_address(address: &str) -> Result<String, Fab3Error> {
    let address = strip_0x(address);
    if address.len() != HEX_ADDRESS_LEN {
        return Err(Fab3Error::malformed(format!(
            "address in wrong format, need 40 chars prefixed with '0x', got {} chars for {address:?}",
            address.len()
        )));
    }
    Ok(address.to_lowercase())
}

fn parse_topics_filter(value: Value) -> Result<TopicsFilter, Fab3Error> {
    let topics = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(topics) => topics,
        _ => return Err(Fab3Error::malformed("topics must be an array")),
    };

    topics
        .into_iter()
        .enumerate()
        .map(|(i, topic)| {
            let at = |e: Fab3Error| {
                Fab3Error::malformed(format!("invalid topic at position {i}: {e}"))
            };
            match topic {
                Value::Null => Ok(vec![String::new()]),
                Value::String(topic) => Ok(vec![parse_topic(&topic).map_err(at)?]),
                Value::Array(choices) => {
                    choices
                        .into_iter()
                        .map(|choice| {
                            match choice {
                                Value::Null => Ok(String::new()),
                                Value::String(topic) => parse_topic(&topic).map_err(at),
                                _ => Err(Fab3Error::malformed("all topics must be strings")),
                            }
                        })
                        .collect()
                }
                other => Err(Fab3Error::malformed(format!("incorrect topics format {other}"))),
            }
        })
        .collect()
}

fn parse_topic(topic: &str) -> Result<String, Fab3Error> {
    let topic = strip_0x(topic);
    if topic.len() != HEX_TOPIC_LEN {
        return Err(Fab3Error::malformed(format!(
            "topic in wrong format, need 64 chars prefixed with '0x', got {} for {topic:?}",
            topic.len()
        )));
    }
    Ok(topic.to_lowercase())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub transaction_index: String,
    pub block_hash: String,
    pub block_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    pub gas_used: String,
    pub cumulative_gas_used: String,
    pub to: String,
    pub logs: Vec<Log>,
    pub status: String,
    pub from: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub block_number: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub block_hash: String,
    pub log_index: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub block_hash: String,
    pub block_number: String,
    pub to: String,
    pub from: String,
    pub input: String,
    pub transaction_index: String,
    pub hash: String,
    pub gas_price: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Full(Vec<Transaction>),
    Hashes(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    pub gas_limit: String,
    pub transactions: BlockTransactions,
}

/// Result of polling a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FilterChanges {
    Blocks(Vec<String>),
    Logs(Vec<Log>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOPIC_A: &str = "0xe920a6ca2d94687457e136223552305dbabca6f28cf9c65d18efc2193a2369b0";
    const TOPIC_B: &str = "0x53616d0000000000000000000000000000000000000000000000000000000000";

    fn parse(value: Value) -> Result<GetLogsArgs, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn empty_object_yields_defaults() {
        assert_eq!(parse(json!({})).unwrap(), GetLogsArgs::default());
    }

    #[test]
    fn block_references_lose_their_prefix() {
        let args = parse(json!({"fromBlock": "0x1", "toBlock": "latest"})).unwrap();
        assert_eq!(args.from_block, "1");
        assert_eq!(args.to_block, "latest");
    }

    #[test]
    fn block_hash_excludes_block_range() {
        let err = parse(json!({"blockHash": "0xabcd", "fromBlock": "0x1"})).unwrap_err();
        assert!(err.to_string().contains("exclusive options"));

        let args = parse(json!({"blockHash": "0xabcd"})).unwrap();
        assert_eq!(args.block_hash, "abcd");
    }

    #[test]
    fn address_accepts_string_or_array() {
        let single = parse(json!({"address": "0xAbCdEf0123456789abcdef0123456789ABCDEF01"})).unwrap();
        assert_eq!(single.address, vec!["abcdef0123456789abcdef0123456789abcdef01"]);

        let many = parse(json!({"address": [
            "0x1111111111111111111111111111111111111111",
            "2222222222222222222222222222222222222222",
        ]}))
        .unwrap();
        assert_eq!(many.address.len(), 2);
        assert_eq!(many.address[1], "2".repeat(40));
    }

    #[test]
    fn address_of_wrong_length_is_rejected() {
        let err = parse(json!({"address": "0x1234"})).unwrap_err();
        assert!(err.to_string().contains("address in wrong format"));

        let err = parse(json!({"address": ["0x1234"]})).unwrap_err();
        assert!(err.to_string().contains("invalid address at position 0"));

        assert!(parse(json!({"address": 7})).is_err());
    }

    #[test]
    fn topics_accept_strings_arrays_and_nulls() {
        let args = parse(json!({"topics": [TOPIC_A, null, [TOPIC_A, TOPIC_B], [null, TOPIC_B], []]})).unwrap();
        assert_eq!(
            args.topics,
            vec![
                vec![strip_0x(TOPIC_A).to_string()],
                vec![String::new()],
                vec![strip_0x(TOPIC_A).to_string(), strip_0x(TOPIC_B).to_string()],
                vec![String::new(), strip_0x(TOPIC_B).to_string()],
                vec![],
            ]
        );
    }

    #[test]
    fn malformed_topics_are_rejected() {
        assert!(parse(json!({"topics": "0x00"})).is_err());
        assert!(parse(json!({"topics": ["0x1234"]})).is_err());
        assert!(parse(json!({"topics": [[1]]})).is_err());
        assert!(parse(json!({"topics": [true]})).is_err());
    }

    #[test]
    fn eth_args_fields_are_optional() {
        let args: EthArgs = serde_json::from_value(json!({"to": "0x12", "gasPrice": "0x1"})).unwrap();
        assert_eq!(args.to, "0x12");
        assert_eq!(args.gas_price, "0x1");
        assert!(args.data.is_empty());
    }

    #[test]
    fn optional_output_fields_are_omitted() {
        let receipt = serde_json::to_value(TxReceipt::default()).unwrap();
        assert!(receipt.get("contractAddress").is_none());
        assert_eq!(receipt["logs"], json!([]));
        assert!(receipt.get("cumulativeGasUsed").is_some());

        let log = serde_json::to_value(Log::default()).unwrap();
        assert!(log.get("data").is_none());
        assert!(log.get("logIndex").is_some());
        assert!(log.get("transactionHash").is_some());
    }

    #[test]
    fn block_serializes_hashes_or_full_transactions() {
        let block = Block {
            number: quantity(2),
            hash: "0x01".into(),
            parent_hash: "0x00".into(),
            gas_limit: ZERO_QUANTITY.into(),
            transactions: BlockTransactions::Hashes(vec!["0xabc".into()]),
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["number"], "0x2");
        assert_eq!(value["parentHash"], "0x00");
        assert_eq!(value["gasLimit"], "0x0");
        assert_eq!(value["transactions"], json!(["0xabc"]));
    }
}
