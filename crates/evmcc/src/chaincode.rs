use alloy_rlp::{
    Encodable,
    Header,
};
use fabric_protos::{
    identity_to_address,
    messages::Response,
};
use revm::{
    bytecode::Bytecode,
    context::result::{
        ExecutionResult,
        ResultAndState,
    },
    primitives::{
        Address,
        B256,
        Bytes,
        Log,
        U256,
        keccak256,
    },
    state::AccountInfo,
};
use tracing::{
    debug,
    instrument,
    warn,
};

use crate::{
    build_evm::{
        call_tx,
        transact,
    },
    error::{
        ChaincodeError,
        Result,
    },
    event::{
        EventManager,
        LogEntry,
    },
    state::StateManager,
    stub::ChaincodeStub,
};

const ADDRESS_LEN: usize = 20;

/// Length of the event name taken from the hex selector of a call.
const EVENT_NAME_LEN: usize = 8;

/// Address bytes naming the event of a deploy. The name is their hex form
/// since raw address bytes need not be valid UTF-8.
const DEPLOY_EVENT_BYTES: usize = 8;

/// Chaincode executing EVM bytecode against the ledger state.
///
/// Accepted arguments:
/// - `["account"]` returns the caller address as lowercase hex
/// - `["getCode", <address>]` returns the hex runtime code, empty if absent
/// - `[<callee>, <input>]` deploys `input` when `callee` is the zero address
///   and calls `callee` otherwise
#[derive(Debug, Default, Clone, Copy)]
pub struct EvmChaincode;

impl EvmChaincode {
    pub fn init<S: ChaincodeStub>(&self, _stub: &mut S) -> Response {
        debug!(target: "evmcc", "init is a no-op");
        Response::success(Vec::new())
    }

    #[instrument(level = "debug", skip_all, target = "evmcc", fields(tx_id = %stub.tx_id()))]
    pub fn invoke<S: ChaincodeStub>(&self, stub: &mut S) -> Response {
        match self.dispatch(stub) {
            Ok(payload) => Response::success(payload),
            Err(e) => {
                warn!(target: "evmcc", error = %e, "invocation failed");
                Response::error(e.to_string())
            }
        }
    }

    fn dispatch<S: ChaincodeStub>(&self, stub: &mut S) -> Result<Vec<u8>> {
        let args = stub.args().to_vec();
        match args.as_slice() {
            [function] if function == b"account" => self.account(stub),
            [function, address] if function == b"getCode" => self.get_code(stub, address),
            [callee, input] => {
                let callee = decode_address(callee)?;
                let caller = caller_address(stub)?;
                let code = hex::decode(input).map_err(ChaincodeError::Input)?;

                if callee == Address::ZERO {
                    self.deploy(stub, caller, code)
                } else {
                    let event_name = String::from_utf8_lossy(prefix(input)).into_owned();
                    self.call(stub, caller, callee, code, &event_name)
                }
            }
            _ => {
                Err(ChaincodeError::ArgCount {
                    got: args.len(),
                    first: args
                        .first()
                        .map(|a| String::from_utf8_lossy(a).into_owned())
                        .unwrap_or_default(),
                })
            }
        }
    }

    fn account<S: ChaincodeStub>(&self, stub: &S) -> Result<Vec<u8>> {
        let caller = caller_address(stub)?;
        Ok(hex::encode(caller).into_bytes())
    }

    fn get_code<S: ChaincodeStub>(&self, stub: &mut S, address: &[u8]) -> Result<Vec<u8>> {
        let address = decode_address(address)?;
        let state = StateManager::new(stub);
        let account = state
            .get_account(&address)
            .map_err(ChaincodeError::GetCode)?;

        Ok(account
            .map(|account| hex::encode(account.code).into_bytes())
            .unwrap_or_default())
    }

    fn deploy<S: ChaincodeStub>(
        &self,
        stub: &mut S,
        caller: Address,
        init_code: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let nonce = keccak256([caller.as_slice(), stub.tx_id().as_bytes()].concat());
        let contract = contract_address(&caller, &nonce);
        debug!(target: "evmcc", %caller, %contract, "deploying contract");

        let init_code = Bytes::from(init_code);
        let mut state = StateManager::new(stub);
        state.stage_account(
            contract,
            AccountInfo {
                balance: U256::ZERO,
                nonce: 1,
                code_hash: keccak256(&init_code),
                code: Some(Bytecode::new_legacy(init_code.clone())),
            },
        );

        let ResultAndState {
            result,
            state: mut changes,
        } = transact(&mut state, call_tx(caller, contract, init_code))
            .map_err(|e| ChaincodeError::Deploy(e.to_string()))?;
        let (runtime, logs) = into_output(result).map_err(ChaincodeError::Deploy)?;
        if runtime.is_empty() {
            return Err(ChaincodeError::Deploy("nil bytecode".into()));
        }

        let account = changes
            .get_mut(&contract)
            .ok_or_else(|| ChaincodeError::Deploy("contract account was not created".into()))?;
        account.info.code_hash = keccak256(&runtime);
        account.info.code = Some(Bytecode::new_legacy(runtime));

        let contract_hex = hex::encode(contract);
        let event_name = hex::encode(&contract.as_slice()[..DEPLOY_EVENT_BYTES]);
        flush_logs(&mut state, &logs, &event_name)?;
        state.apply(changes).map_err(ChaincodeError::Sync)?;

        Ok(contract_hex.into_bytes())
    }

    fn call<S: ChaincodeStub>(
        &self,
        stub: &mut S,
        caller: Address,
        callee: Address,
        input: Vec<u8>,
        event_name: &str,
    ) -> Result<Vec<u8>> {
        debug!(target: "evmcc", %caller, %callee, "calling contract");

        let mut state = StateManager::new(stub);
        let ResultAndState { result, state: changes } =
            transact(&mut state, call_tx(caller, callee, input.into()))
                .map_err(|e| ChaincodeError::Execute(e.to_string()))?;
        let (output, logs) = into_output(result).map_err(ChaincodeError::Execute)?;

        flush_logs(&mut state, &logs, event_name)?;
        state.apply(changes).map_err(ChaincodeError::Sync)?;

        Ok(output.to_vec())
    }
}

/// Address of a contract deployed by `caller` with `nonce`:
/// `keccak256(rlp([caller, nonce]))[12..]`.
pub fn contract_address(caller: &Address, nonce: &B256) -> Address {
    let payload_length = caller.as_slice().length() + nonce.as_slice().length();
    let mut out = Vec::with_capacity(payload_length + 1);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    caller.as_slice().encode(&mut out);
    nonce.as_slice().encode(&mut out);
    Address::from_word(keccak256(out))
}

fn caller_address<S: ChaincodeStub>(stub: &S) -> Result<Address> {
    let creator = stub.creator().map_err(ChaincodeError::Creator)?;
    Ok(identity_to_address(&creator)?)
}

fn decode_address(raw: &[u8]) -> Result<Address> {
    let bytes = hex::decode(raw).map_err(|reason| {
        ChaincodeError::CalleeHex {
            raw: String::from_utf8_lossy(raw).into_owned(),
            reason,
        }
    })?;
    if bytes.len() != ADDRESS_LEN {
        return Err(ChaincodeError::CalleeLength(bytes.len()));
    }
    Ok(Address::from_slice(&bytes))
}

fn prefix(input: &[u8]) -> &[u8] {
    &input[..input.len().min(EVENT_NAME_LEN)]
}

fn into_output(result: ExecutionResult) -> std::result::Result<(Bytes, Vec<Log>), String> {
    match result {
        ExecutionResult::Success { output, logs, .. } => Ok((output.into_data(), logs)),
        ExecutionResult::Revert { output, .. } => {
            Err(format!("execution reverted: 0x{}", hex::encode(output)))
        }
        ExecutionResult::Halt { reason, .. } => Err(format!("execution halted: {reason:?}")),
    }
}

fn flush_logs<S: ChaincodeStub>(
    state: &mut StateManager<'_, S>,
    logs: &[Log],
    event_name: &str,
) -> Result<()> {
    let mut events = EventManager::default();
    for log in logs {
        events.log(LogEntry::from(log));
    }
    debug!(target: "evmcc", count = events.len(), event_name, "flushing logs");
    events
        .flush(state.stub(), event_name)
        .map_err(|e| ChaincodeError::Flush(e.to_string()))
}
