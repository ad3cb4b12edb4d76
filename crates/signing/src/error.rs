pub type Result<T, E = SignedTxError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SignedTxError {
    #[error("Decode error: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    #[error("Decode error: transaction is not an rlp list")]
    NotAList,
    #[error("Decode error: {0} unexpected bytes after the transaction fields")]
    TrailingBytes(usize),
    #[error("Decode error: {field} value is too big")]
    IntegerTooLarge { field: &'static str },
    #[error("Decode error: recipient must be empty or 20 bytes, got {0}")]
    InvalidRecipient(usize),
    #[error("private chain ID is not supported")]
    UnsupportedChainId,
    #[error("invalid signature: r,s value is too big")]
    SignatureTooLarge,
    #[error("invalid signature: recovery id {0} is neither 0 nor 1")]
    InvalidRecoveryId(u64),
    #[error("invalid signature: {0}")]
    Recovery(#[from] k256::ecdsa::Error),
    #[error("invalid public key")]
    InvalidPublicKey,
}
