//! Walks ledger transaction envelopes down to the chaincode action.
//!
//! `envelope -> payload -> (header -> channel header, data -> transaction ->
//! actions[0] -> action payload -> (proposal payload, response payload ->
//! extension -> chaincode action))`
//!
//! Block level helpers report failures per transaction so callers can decide
//! whether one bad envelope skips a transaction or fails the request.

use prost::Message;

use crate::{
    block::TxValidationFlags,
    error::{
        ArtifactError,
        Result,
    },
    messages::{
        Block,
        ChaincodeAction,
        ChaincodeActionPayload,
        ChaincodeEvent,
        ChaincodeInvocationSpec,
        ChaincodeProposalPayload,
        ChannelHeader,
        Envelope,
        HeaderType,
        Payload,
        ProposalResponsePayload,
        SignatureHeader,
        Transaction,
    },
};

/// A decoded envelope together with its channel header.
#[derive(Debug, Clone)]
pub struct EnvelopeView {
    pub payload: Payload,
    pub channel_header: ChannelHeader,
}

impl EnvelopeView {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope = Envelope::decode(bytes).map_err(ArtifactError::decode("envelope"))?;
        let payload =
            Payload::decode(envelope.payload.as_slice()).map_err(ArtifactError::decode("payload"))?;
        let header = payload
            .header
            .as_ref()
            .ok_or(ArtifactError::Missing("payload header"))?;
        let channel_header = ChannelHeader::decode(header.channel_header.as_slice())
            .map_err(ArtifactError::decode("channel header"))?;

        Ok(Self {
            payload,
            channel_header,
        })
    }

    pub fn tx_id(&self) -> &str {
        &self.channel_header.tx_id
    }

    pub fn is_endorser_transaction(&self) -> bool {
        self.channel_header.r#type == HeaderType::EndorserTransaction as i32
    }

    /// Serialized identity of the transaction creator.
    pub fn creator(&self) -> Result<Vec<u8>> {
        let header = self
            .payload
            .header
            .as_ref()
            .ok_or(ArtifactError::Missing("payload header"))?;
        let signature_header = SignatureHeader::decode(header.signature_header.as_slice())
            .map_err(ArtifactError::decode("signature header"))?;
        Ok(signature_header.creator)
    }

    /// Decodes the first action of an endorser transaction.
    pub fn chaincode_action(&self) -> Result<ChaincodeActionView> {
        let transaction = Transaction::decode(self.payload.data.as_slice())
            .map_err(ArtifactError::decode("transaction"))?;
        let action = transaction
            .actions
            .first()
            .ok_or(ArtifactError::NoActions)?;

        let action_payload = ChaincodeActionPayload::decode(action.payload.as_slice())
            .map_err(ArtifactError::decode("chaincode action payload"))?;
        let endorsed = action_payload
            .action
            .as_ref()
            .filter(|a| !a.proposal_response_payload.is_empty())
            .ok_or(ArtifactError::Missing("proposal response payload"))?;

        let proposal_payload =
            ChaincodeProposalPayload::decode(action_payload.chaincode_proposal_payload.as_slice())
                .map_err(ArtifactError::decode("chaincode proposal payload"))?;
        let response_payload =
            ProposalResponsePayload::decode(endorsed.proposal_response_payload.as_slice())
                .map_err(ArtifactError::decode("proposal response payload"))?;
        if response_payload.extension.is_empty() {
            return Err(ArtifactError::Missing("response payload extension"));
        }
        let action = ChaincodeAction::decode(response_payload.extension.as_slice())
            .map_err(ArtifactError::decode("chaincode action"))?;

        let invocation = ChaincodeInvocationSpec::decode(proposal_payload.input.as_slice())
            .map_err(ArtifactError::decode("chaincode invocation spec"))?;
        let args = invocation
            .chaincode_spec
            .and_then(|spec| spec.input)
            .map(|input| input.args)
            .unwrap_or_default();

        Ok(ChaincodeActionView { args, action })
    }
}

/// Invocation arguments and the endorsed result of one chaincode call.
#[derive(Debug, Clone, Default)]
pub struct ChaincodeActionView {
    pub args: Vec<Vec<u8>>,
    pub action: ChaincodeAction,
}

impl ChaincodeActionView {
    pub fn response_payload(&self) -> &[u8] {
        self.action
            .response
            .as_ref()
            .map(|r| r.payload.as_slice())
            .unwrap_or_default()
    }

    /// The chaincode event set during the invocation, if any.
    pub fn event(&self) -> Result<Option<ChaincodeEvent>> {
        if self.action.events.is_empty() {
            return Ok(None);
        }
        ChaincodeEvent::decode(self.action.events.as_slice())
            .map(Some)
            .map_err(ArtifactError::decode("chaincode event"))
    }
}

/// One entry of a block's data section.
#[derive(Debug)]
pub struct BlockTransaction {
    pub index: usize,
    /// Validation code from the transactions filter.
    pub validation_code: Option<u8>,
    /// `None` when the data entry is empty.
    pub envelope: Option<Result<EnvelopeView>>,
}

impl BlockTransaction {
    pub fn is_valid(&self) -> bool {
        self.validation_code == Some(crate::block::TX_VALID)
    }
}

/// Decodes every entry of a block independently.
pub fn block_transactions(block: &Block) -> Vec<BlockTransaction> {
    let flags = TxValidationFlags::from_block(block);
    let data = block
        .data
        .as_ref()
        .map(|d| d.data.as_slice())
        .unwrap_or_default();

    data.iter()
        .enumerate()
        .map(|(index, raw)| BlockTransaction {
            index,
            validation_code: flags.flag(index),
            envelope: (!raw.is_empty()).then(|| EnvelopeView::decode(raw)),
        })
        .collect()
}

/// Finds the transaction with `tx_id` in a block.
///
/// Empty entries are skipped, an undecodable envelope fails the search.
pub fn find_transaction(block: &Block, tx_id: &str) -> Result<Option<(usize, EnvelopeView)>> {
    for transaction in block_transactions(block) {
        let Some(envelope) = transaction.envelope else {
            continue;
        };
        let envelope = envelope?;
        if envelope.tx_id() == tx_id {
            return Ok(Some((transaction.index, envelope)));
        }
    }
    Ok(None)
}
