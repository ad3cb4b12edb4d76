//! EVM chaincode: runs EVM bytecode as ledger transaction logic, keeping
//! accounts and storage in the chaincode key-value state.

pub mod build_evm;
pub mod chaincode;
pub mod error;
pub mod event;
pub mod state;
pub mod stub;

pub use chaincode::{
    EvmChaincode,
    contract_address,
};
pub use error::{
    ChaincodeError,
    StateError,
    StubError,
};
pub use event::{
    EventManager,
    LogEntry,
};
pub use state::{
    StateManager,
    StoredAccount,
};
pub use stub::{
    ChaincodeStub,
    MemoryStub,
};
