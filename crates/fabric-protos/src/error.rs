use thiserror::Error;

pub type Result<T, E = ArtifactError> = std::result::Result<T, E>;

/// Failure to walk a ledger artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: prost::DecodeError,
    },
    #[error("{0} is missing")]
    Missing(&'static str),
    #[error("transaction has no actions")]
    NoActions,
    #[error("block number {0} does not fit in an ASN.1 INTEGER")]
    BlockNumberOverflow(u64),
    #[error("failed to encode block header: {0}")]
    HeaderEncoding(String),
}

impl ArtifactError {
    pub(crate) fn decode(what: &'static str) -> impl FnOnce(prost::DecodeError) -> Self {
        move |source| Self::Decode { what, source }
    }
}

/// Failure to derive an address from a ledger identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to unmarshal serialized identity: {0}")]
    MalformedIdentity(#[from] prost::DecodeError),
    #[error("no pem data found")]
    NoPem,
    #[error("failed to parse certificate: {0}")]
    Certificate(String),
    #[error("unable to marshal public key: {0}")]
    PublicKey(String),
}
