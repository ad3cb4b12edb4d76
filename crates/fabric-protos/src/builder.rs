//! Assembles envelopes and blocks the way an ordering service commits them.

use prost::Message;
use sha2::{
    Digest,
    Sha256,
};

use crate::{
    block::data_hash,
    messages::{
        Block,
        BlockData,
        BlockHeader,
        BlockMetadata,
        BlockMetadataIndex,
        ChaincodeAction,
        ChaincodeActionPayload,
        ChaincodeEndorsedAction,
        ChaincodeId,
        ChaincodeInput,
        ChaincodeInvocationSpec,
        ChaincodeProposalPayload,
        ChaincodeSpec,
        ChannelHeader,
        Envelope,
        Header,
        HeaderType,
        Payload,
        ProposalResponsePayload,
        Response,
        SignatureHeader,
        Transaction,
        TransactionAction,
    },
};

/// Transaction id derived from the proposal nonce and creator.
pub fn compute_tx_id(nonce: &[u8], creator: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(creator);
    hex::encode(hasher.finalize())
}

/// An endorsed chaincode invocation ready to be wrapped into an envelope.
#[derive(Debug, Clone, Default)]
pub struct EndorserTransaction {
    pub channel_id: String,
    pub tx_id: String,
    pub creator: Vec<u8>,
    pub nonce: Vec<u8>,
    pub chaincode_id: String,
    pub args: Vec<Vec<u8>>,
    pub response: Response,
    /// Encoded `ChaincodeEvent`, empty when the invocation set none.
    pub events: Vec<u8>,
}

impl EndorserTransaction {
    pub fn to_envelope(&self) -> Envelope {
        let chaincode_id = ChaincodeId {
            name: self.chaincode_id.clone(),
            ..Default::default()
        };

        let invocation = ChaincodeInvocationSpec {
            chaincode_spec: Some(ChaincodeSpec {
                chaincode_id: Some(chaincode_id.clone()),
                input: Some(ChaincodeInput {
                    args: self.args.clone(),
                }),
                ..Default::default()
            }),
        };
        let proposal_payload = ChaincodeProposalPayload {
            input: invocation.encode_to_vec(),
        };

        let action = ChaincodeAction {
            results: Vec::new(),
            events: self.events.clone(),
            response: Some(self.response.clone()),
            chaincode_id: Some(chaincode_id),
        };
        let response_payload = ProposalResponsePayload {
            proposal_hash: Sha256::digest(proposal_payload.encode_to_vec()).to_vec(),
            extension: action.encode_to_vec(),
        };

        let action_payload = ChaincodeActionPayload {
            chaincode_proposal_payload: proposal_payload.encode_to_vec(),
            action: Some(ChaincodeEndorsedAction {
                proposal_response_payload: response_payload.encode_to_vec(),
                endorsements: Vec::new(),
            }),
        };

        let signature_header = self.signature_header().encode_to_vec();
        let transaction = Transaction {
            actions: vec![TransactionAction {
                header: signature_header.clone(),
                payload: action_payload.encode_to_vec(),
            }],
        };

        envelope(
            HeaderType::EndorserTransaction,
            &self.channel_id,
            &self.tx_id,
            signature_header,
            transaction.encode_to_vec(),
        )
    }

    fn signature_header(&self) -> SignatureHeader {
        SignatureHeader {
            creator: self.creator.clone(),
            nonce: self.nonce.clone(),
        }
    }
}

/// Channel configuration envelope, as found in the genesis block.
pub fn config_envelope(channel_id: &str, tx_id: &str) -> Envelope {
    envelope(
        HeaderType::Config,
        channel_id,
        tx_id,
        SignatureHeader::default().encode_to_vec(),
        Vec::new(),
    )
}

fn envelope(
    header_type: HeaderType,
    channel_id: &str,
    tx_id: &str,
    signature_header: Vec<u8>,
    data: Vec<u8>,
) -> Envelope {
    let channel_header = ChannelHeader {
        r#type: header_type as i32,
        channel_id: channel_id.to_string(),
        tx_id: tx_id.to_string(),
        ..Default::default()
    };
    let payload = Payload {
        header: Some(Header {
            channel_header: channel_header.encode_to_vec(),
            signature_header,
        }),
        data,
    };

    Envelope {
        payload: payload.encode_to_vec(),
        signature: Vec::new(),
    }
}

/// Builds a block over raw envelopes, recording one validation code per entry.
pub fn block_with_transactions(
    number: u64,
    previous_hash: Vec<u8>,
    data: Vec<Vec<u8>>,
    validation_codes: Vec<u8>,
) -> Block {
    let mut metadata = vec![Vec::new(); BlockMetadataIndex::TransactionsFilter as usize + 1];
    metadata[BlockMetadataIndex::TransactionsFilter as usize] = validation_codes;

    Block {
        header: Some(BlockHeader {
            number,
            previous_hash,
            data_hash: data_hash(&data),
        }),
        data: Some(BlockData { data }),
        metadata: Some(BlockMetadata { metadata }),
    }
}
