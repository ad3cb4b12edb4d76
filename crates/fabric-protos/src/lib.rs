//! Ledger wire types shared by the EVM chaincode and the `fab3` gateway.

pub mod artifact;
pub mod block;
pub mod builder;
pub mod error;
pub mod identity;
pub mod messages;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use artifact::{
    BlockTransaction,
    ChaincodeActionView,
    EnvelopeView,
    block_transactions,
    find_transaction,
};
pub use error::{
    ArtifactError,
    IdentityError,
};
pub use identity::{
    certificate_to_address,
    identity_to_address,
    serialize_identity,
};
