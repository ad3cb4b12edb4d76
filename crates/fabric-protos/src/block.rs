use der::{
    Encode,
    Sequence,
    asn1::OctetStringRef,
};
use sha2::{
    Digest,
    Sha256,
};

use crate::{
    error::{
        ArtifactError,
        Result,
    },
    messages::{
        Block,
        BlockHeader,
        BlockMetadataIndex,
    },
};

/// Validation code of a committed transaction.
pub const TX_VALID: u8 = 0;
/// Validation code of a transaction whose endorsement did not satisfy policy.
pub const TX_ENDORSEMENT_POLICY_FAILURE: u8 = 10;
/// Validation code of a transaction rejected for an unlisted reason.
pub const TX_INVALID_OTHER_REASON: u8 = 255;

#[derive(Sequence)]
struct Asn1Header<'a> {
    number: i64,
    previous_hash: OctetStringRef<'a>,
    data_hash: OctetStringRef<'a>,
}

/// Hash chaining blocks together: SHA-256 over the DER encoding of
/// `SEQUENCE { number, previous_hash, data_hash }`.
pub fn header_hash(header: &BlockHeader) -> Result<Vec<u8>> {
    let number = i64::try_from(header.number)
        .map_err(|_| ArtifactError::BlockNumberOverflow(header.number))?;
    let encoding_error = |e: der::Error| ArtifactError::HeaderEncoding(e.to_string());

    let asn1 = Asn1Header {
        number,
        previous_hash: OctetStringRef::new(&header.previous_hash).map_err(encoding_error)?,
        data_hash: OctetStringRef::new(&header.data_hash).map_err(encoding_error)?,
    };
    let encoded = asn1.to_der().map_err(encoding_error)?;

    Ok(Sha256::digest(encoded).to_vec())
}

/// SHA-256 over the concatenated transaction envelopes of a block.
pub fn data_hash(data: &[Vec<u8>]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for entry in data {
        hasher.update(entry);
    }
    hasher.finalize().to_vec()
}

/// Per-transaction validation codes stored in the block metadata.
#[derive(Debug, Clone, Copy)]
pub struct TxValidationFlags<'a>(&'a [u8]);

impl<'a> TxValidationFlags<'a> {
    pub fn from_block(block: &'a Block) -> Self {
        let flags = block
            .metadata
            .as_ref()
            .and_then(|m| m.metadata.get(BlockMetadataIndex::TransactionsFilter as usize))
            .map(Vec::as_slice)
            .unwrap_or_default();
        Self(flags)
    }

    /// Validation code of the transaction at `index`, if the block carries one.
    pub fn flag(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    /// A transaction without a recorded code is not valid.
    pub fn is_valid(&self, index: usize) -> bool {
        self.flag(index) == Some(TX_VALID)
    }
}
