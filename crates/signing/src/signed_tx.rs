use alloy_primitives::{
    Address,
    Bytes,
    U256,
    keccak256,
};
use alloy_rlp::{
    EMPTY_STRING_CODE,
    Header,
};
use k256::ecdsa::{
    RecoveryId,
    Signature,
    VerifyingKey,
};

use crate::error::{
    Result,
    SignedTxError,
};

/// Largest chain id that encodes as a single byte.
const MAX_CHAIN_ID: u64 = 0x7f;

/// A legacy Ethereum transaction decoded from its signed RLP encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
    unsigned: Vec<u8>,
    signer: Option<Address>,
}

impl SignedTx {
    /// Decodes `raw`, rebuilds the EIP-155 signing payload and recovers the
    /// signer. A transaction with empty `r` and `s` decodes without a signer.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let mut buf = raw;
        let header = Header::decode(&mut buf)?;
        if !header.list {
            return Err(SignedTxError::NotAList);
        }
        if buf.len() < header.payload_length {
            return Err(alloy_rlp::Error::InputTooShort.into());
        }
        if buf.len() > header.payload_length {
            return Err(SignedTxError::TrailingBytes(
                buf.len() - header.payload_length,
            ));
        }

        let message_start = raw.len() - buf.len();
        let nonce = read_u64(&mut buf, "nonce")?;
        let gas_price = read_u256(&mut buf, "gasPrice")?;
        let gas_limit = read_u64(&mut buf, "gas")?;
        let to = match Header::decode_bytes(&mut buf, false)? {
            [] => None,
            bytes if bytes.len() == 20 => Some(Address::from_slice(bytes)),
            bytes => return Err(SignedTxError::InvalidRecipient(bytes.len())),
        };
        let value = read_u256(&mut buf, "value")?;
        let input = Bytes::copy_from_slice(Header::decode_bytes(&mut buf, false)?);

        let signature_start = raw.len() - buf.len();
        let v = read_u256(&mut buf, "v")?;
        let r = read_signature_value(&mut buf)?;
        let s = read_signature_value(&mut buf)?;
        if !buf.is_empty() {
            return Err(SignedTxError::TrailingBytes(buf.len()));
        }

        let mut tx = Self {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            input,
            v,
            r,
            s,
            unsigned: Vec::new(),
            signer: None,
        };
        tx.unsigned = tx.encode_unsigned(&raw[message_start..signature_start])?;
        tx.signer = tx.recover_signer()?;
        Ok(tx)
    }

    /// Chain id carried in `v` per EIP-155. Only ids in `1..=0x7f` are
    /// supported.
    pub fn chain_id(&self) -> Result<u64> {
        let chain_id = if self.v < U256::from(27) {
            Some(self.v)
        } else {
            self.v.checked_sub(U256::from(35)).map(|v| v / U256::from(2))
        };

        chain_id
            .and_then(|id| u64::try_from(id).ok())
            .filter(|id| (1..=MAX_CHAIN_ID).contains(id))
            .ok_or(SignedTxError::UnsupportedChainId)
    }

    /// The RLP encoded signing payload: the message fields followed by
    /// `[chain_id, "", ""]`.
    pub fn unsigned(&self) -> &[u8] {
        &self.unsigned
    }

    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    /// `0x` prefixed recipient, the zero address for contract creation.
    pub fn callee_address(&self) -> String {
        format!("{:#x}", self.to.unwrap_or_default())
    }

    /// `0x` prefixed signer, the zero address when unsigned.
    pub fn caller_address(&self) -> String {
        format!("{:#x}", self.signer.unwrap_or_default())
    }

    fn encode_unsigned(&self, message: &[u8]) -> Result<Vec<u8>> {
        let chain_id = self.chain_id()? as u8;

        let payload_length = message.len() + 3;
        let mut out = Vec::with_capacity(payload_length + 9);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        out.extend_from_slice(message);
        out.extend_from_slice(&[chain_id, EMPTY_STRING_CODE, EMPTY_STRING_CODE]);
        Ok(out)
    }

    fn recover_signer(&self) -> Result<Option<Address>> {
        if self.r.is_zero() || self.s.is_zero() {
            return Ok(None);
        }

        let chain_id = self.chain_id()?;
        let recovery = self
            .v
            .checked_sub(U256::from(2 * chain_id + 35))
            .and_then(|id| u8::try_from(id).ok())
            .filter(|id| *id <= 1)
            .ok_or_else(|| {
                SignedTxError::InvalidRecoveryId(self.v.saturating_to::<u64>())
            })?;
        let recovery_id =
            RecoveryId::from_byte(recovery).ok_or(SignedTxError::InvalidRecoveryId(recovery.into()))?;

        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        rs[32..].copy_from_slice(&self.s.to_be_bytes::<32>());
        let signature = Signature::from_slice(&rs)?;

        let hash = keccak256(&self.unsigned);
        let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)?;
        let point = key.to_encoded_point(false);
        let public_key = point.as_bytes();
        if public_key.first() != Some(&0x04) {
            return Err(SignedTxError::InvalidPublicKey);
        }

        Ok(Some(Address::from_slice(
            &keccak256(&public_key[1..])[12..],
        )))
    }
}

fn read_u64(buf: &mut &[u8], field: &'static str) -> Result<u64> {
    let bytes = Header::decode_bytes(buf, false)?;
    if bytes.len() > 8 {
        return Err(SignedTxError::IntegerTooLarge { field });
    }
    let mut word = [0u8; 8];
    word[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(word))
}

fn read_u256(buf: &mut &[u8], field: &'static str) -> Result<U256> {
    let bytes = Header::decode_bytes(buf, false)?;
    U256::try_from_be_slice(bytes).ok_or(SignedTxError::IntegerTooLarge { field })
}

fn read_signature_value(buf: &mut &[u8]) -> Result<U256> {
    let bytes = Header::decode_bytes(buf, false)?;
    if bytes.len() > 32 {
        return Err(SignedTxError::SignatureTooLarge);
    }
    Ok(U256::from_be_slice(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_rlp::Encodable;
    use k256::ecdsa::SigningKey;

    const EIP155_TX: &str = "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";
    const RAW_TX: &str = "f86d820144843b9aca0082520894b78777860637d56543da23312c7865024833f7d188016345785d8a0000802ba0e2539a5d9f056d7095bd19d6b77b850910eeafb71534ebd45159915fab202e91a007484420f3968697974413fc55d1142dc76285d30b1b9231ccb71ed1e720faae";
    const BROKEN_TX: &str = "f86d820144843b9aca0082520894b78777860637d56543da23312c";

    fn decode(tx: &str) -> Result<SignedTx> {
        SignedTx::decode(&hex::decode(tx).unwrap())
    }

    #[test]
    fn decodes_eip155_reference_transaction() {
        let tx = decode(EIP155_TX).unwrap();

        assert_eq!(tx.nonce, 9);
        assert_eq!(tx.gas_price, U256::from(20_000_000_000u64));
        assert_eq!(tx.gas_limit, 21000);
        assert_eq!(
            tx.callee_address(),
            "0x3535353535353535353535353535353535353535"
        );
        assert_eq!(tx.value, U256::from(1_000_000_000_000_000_000u64));
        assert!(tx.input.is_empty());
        assert_eq!(tx.v, U256::from(37));
        assert_eq!(
            tx.r,
            U256::from_str_radix(
                "18515461264373351373200002665853028612451056578545711640558177340181847433846",
                10
            )
            .unwrap()
        );
        assert_eq!(
            tx.s,
            U256::from_str_radix(
                "46948507304638947509940763649030358759909902576025900602547168820602576006531",
                10
            )
            .unwrap()
        );
        assert_eq!(tx.chain_id().unwrap(), 1);
        assert_eq!(
            tx.caller_address(),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
    }

    #[test]
    fn unsigned_payload_decodes_as_unsigned_transaction() {
        let tx = decode(EIP155_TX).unwrap();
        // Signing data from the EIP-155 example.
        assert_eq!(
            hex::encode(tx.unsigned()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );

        let unsigned = SignedTx::decode(tx.unsigned()).unwrap();
        assert_eq!(unsigned.nonce, 9);
        assert_eq!(unsigned.gas_limit, 21000);
        assert_eq!(unsigned.callee_address(), tx.callee_address());
        assert_eq!(unsigned.v, U256::from(tx.chain_id().unwrap()));
        assert!(unsigned.r.is_zero());
        assert!(unsigned.s.is_zero());
        assert!(unsigned.signer().is_none());
        assert_eq!(unsigned.unsigned(), tx.unsigned());
    }

    #[test]
    fn decodes_mainnet_transaction() {
        let tx = decode(RAW_TX).unwrap();

        assert_eq!(tx.nonce, 324);
        assert_eq!(tx.gas_price, U256::from(1_000_000_000u64));
        assert_eq!(tx.gas_limit, 21000);
        assert_eq!(
            tx.callee_address(),
            "0xb78777860637d56543da23312c7865024833f7d1"
        );
        assert_eq!(tx.value, U256::from(100_000_000_000_000_000u64));
        assert_eq!(tx.v, U256::from(0x2b));
        assert_eq!(
            tx.r,
            U256::from_str_radix(
                "e2539a5d9f056d7095bd19d6b77b850910eeafb71534ebd45159915fab202e91",
                16
            )
            .unwrap()
        );
        assert_eq!(tx.chain_id().unwrap(), 4);
        assert_eq!(
            tx.caller_address(),
            "0x17da6a8b86578cec4525945a355e8384025fa5af"
        );
    }

    #[test]
    fn rejects_truncated_transaction() {
        assert!(matches!(decode(BROKEN_TX), Err(SignedTxError::Rlp(_))));
    }

    #[test]
    fn rejects_pre_eip155_signature() {
        // Same fields as the reference transaction, v = 27.
        let tx = EIP155_TX.replacen("8025a0", "801ba0", 1);
        assert!(matches!(decode(&tx), Err(SignedTxError::UnsupportedChainId)));
    }

    #[test]
    fn rejects_oversized_signature_values() {
        let mut fields = Vec::new();
        for field in [&[9u8][..], &[1], &[0x52, 0x08], &[0x35; 20], &[1], &[], &[37]] {
            field.encode(&mut fields);
        }
        [0x11u8; 33].as_slice().encode(&mut fields);
        [0x22u8; 32].as_slice().encode(&mut fields);

        let mut raw = Vec::new();
        Header {
            list: true,
            payload_length: fields.len(),
        }
        .encode(&mut raw);
        raw.extend_from_slice(&fields);

        assert!(matches!(
            SignedTx::decode(&raw),
            Err(SignedTxError::SignatureTooLarge)
        ));
    }

    #[test]
    fn recovers_signer_of_locally_signed_transaction() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let chain_id = 3u64;
        let fields = |out: &mut Vec<u8>| {
            7u64.encode(out);
            1_000u64.encode(out);
            50_000u64.encode(out);
            [0xaa; 20].as_slice().encode(out);
            0u64.encode(out);
            [0x60, 0x00].as_slice().encode(out);
        };
        let list = |payload: Vec<u8>| {
            let mut out = Vec::new();
            Header {
                list: true,
                payload_length: payload.len(),
            }
            .encode(&mut out);
            out.extend(payload);
            out
        };

        let mut unsigned = Vec::new();
        fields(&mut unsigned);
        chain_id.encode(&mut unsigned);
        unsigned.extend_from_slice(&[EMPTY_STRING_CODE, EMPTY_STRING_CODE]);
        let unsigned = list(unsigned);

        let (signature, recovery_id) = key
            .sign_prehash_recoverable(keccak256(&unsigned).as_slice())
            .unwrap();
        let (r, s) = signature.split_bytes();

        let mut signed = Vec::new();
        fields(&mut signed);
        (u64::from(recovery_id.to_byte()) + 35 + 2 * chain_id).encode(&mut signed);
        U256::from_be_slice(&r).to_be_bytes_trimmed_vec().as_slice().encode(&mut signed);
        U256::from_be_slice(&s).to_be_bytes_trimmed_vec().as_slice().encode(&mut signed);
        let signed = list(signed);

        let tx = SignedTx::decode(&signed).unwrap();
        let public_key = key.verifying_key().to_encoded_point(false);
        let expected = Address::from_slice(&keccak256(&public_key.as_bytes()[1..])[12..]);

        assert_eq!(tx.unsigned(), unsigned.as_slice());
        assert_eq!(tx.chain_id().unwrap(), chain_id);
        assert_eq!(tx.signer(), Some(expected));
        assert_eq!(tx.input, Bytes::from_static(&[0x60, 0x00]));
    }
}
