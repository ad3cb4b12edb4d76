//! Decoding and signer recovery for RLP encoded legacy Ethereum
//! transactions signed under EIP-155.

pub mod error;
mod signed_tx;

pub use error::{
    Result,
    SignedTxError,
};
pub use signed_tx::SignedTx;
