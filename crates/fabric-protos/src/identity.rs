//! Binds ledger identities to 20-byte EVM addresses.
//!
//! The address is the trailing 20 bytes of the SHA3-256 digest of the
//! certificate's DER encoded `SubjectPublicKeyInfo`.

use alloy_primitives::Address;
use prost::Message;
use sha3::{
    Digest,
    Sha3_256,
};
use x509_parser::{
    pem::parse_x509_pem,
    public_key::PublicKey,
};

use crate::{
    error::IdentityError,
    messages::SerializedIdentity,
};

/// Derives the address of a serialized MSP identity (the transaction creator).
pub fn identity_to_address(creator: &[u8]) -> Result<Address, IdentityError> {
    let identity = SerializedIdentity::decode(creator)?;
    certificate_to_address(&identity.id_bytes)
}

/// Derives the address of a PEM encoded X.509 certificate.
pub fn certificate_to_address(pem: &[u8]) -> Result<Address, IdentityError> {
    let (_, pem) = parse_x509_pem(pem).map_err(|_| IdentityError::NoPem)?;
    let cert = pem
        .parse_x509()
        .map_err(|e| IdentityError::Certificate(e.to_string()))?;

    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::Unknown(_)) => {
            return Err(IdentityError::PublicKey(format!(
                "unsupported key algorithm {}",
                spki.algorithm.algorithm
            )));
        }
        Err(e) => return Err(IdentityError::PublicKey(e.to_string())),
        Ok(_) => {}
    }

    let digest = Sha3_256::digest(spki.raw);
    Ok(Address::from_slice(&digest[12..]))
}

/// Wraps a PEM certificate into the serialized identity the ledger attaches
/// to proposals.
pub fn serialize_identity(mspid: &str, certificate_pem: &[u8]) -> Vec<u8> {
    SerializedIdentity {
        mspid: mspid.to_string(),
        id_bytes: certificate_pem.to_vec(),
    }
    .encode_to_vec()
}
