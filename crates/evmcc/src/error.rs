use fabric_protos::IdentityError;
use revm::{
    context::DBErrorMarker,
    primitives::B256,
};

pub type Result<T, E = ChaincodeError> = std::result::Result<T, E>;

/// Failure reported by a chaincode stub.
#[derive(Debug, thiserror::Error)]
pub enum StubError {
    #[error("key must not be empty")]
    EmptyKey,
    #[error("event name can not be empty")]
    EmptyEventName,
    #[error("{0}")]
    Backend(String),
}

/// Failure of the state adapter while serving the interpreter.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Stub(#[from] StubError),
    #[error("failed to encode account: {0}")]
    EncodeAccount(#[source] bincode::Error),
    #[error("failed to decode account at {key}: {source}")]
    DecodeAccount {
        key: String,
        #[source]
        source: bincode::Error,
    },
    #[error("storage value at {key} has {len} bytes, expected 32")]
    MalformedSlot { key: String, len: usize },
    #[error("no code stored for hash {0}")]
    UnknownCodeHash(B256),
}

impl DBErrorMarker for StateError {}

/// Failure of one chaincode invocation. The message is what the ledger
/// reports back to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum ChaincodeError {
    #[error("expects 2 args, got {got} : {first}")]
    ArgCount { got: usize, first: String },
    #[error("failed to decode callee address from {raw}: {reason}")]
    CalleeHex { raw: String, reason: hex::FromHexError },
    #[error("failed to get callee address: expected 20 bytes, got {0}")]
    CalleeLength(usize),
    #[error("failed to get creator: {0}")]
    Creator(#[source] StubError),
    #[error("failed to get caller address: {0}")]
    Caller(#[from] IdentityError),
    #[error("failed to decode input bytes: {0}")]
    Input(#[source] hex::FromHexError),
    #[error("failed to deploy code: {0}")]
    Deploy(String),
    #[error("failed to execute contract: {0}")]
    Execute(String),
    #[error("failed to get contract account: {0}")]
    GetCode(#[source] StateError),
    #[error("error in Flush: {0}")]
    Flush(String),
    #[error("failed to sync: {0}")]
    Sync(#[source] StateError),
}
