use revm::{
    Context,
    Database,
    ExecuteEvm,
    MainBuilder,
    MainContext,
    context::{
        BlockEnv,
        CfgEnv,
        TxEnv,
        result::{
            EVMError,
            ResultAndState,
        },
    },
    primitives::{
        Address,
        Bytes,
        TxKind,
        hardfork::SpecId,
    },
};

/// Gas available to a single invocation. Gas is never charged, the budget
/// only bounds execution.
pub const GAS_LIMIT: u64 = 30_000_000;

/// Cancun rules without a fee market or caller nonce accounting.
pub fn evm_cfg() -> CfgEnv {
    let mut cfg_env = CfgEnv::default();
    cfg_env.spec = SpecId::CANCUN;
    cfg_env.disable_nonce_check = true;
    cfg_env
}

pub fn block_env() -> BlockEnv {
    BlockEnv {
        gas_limit: GAS_LIMIT,
        basefee: 0,
        ..Default::default()
    }
}

/// A zero priced message call from `caller` to `callee`.
pub fn call_tx(caller: Address, callee: Address, input: Bytes) -> TxEnv {
    TxEnv {
        caller,
        kind: TxKind::Call(callee),
        data: input,
        gas_limit: GAS_LIMIT,
        gas_price: 0,
        ..Default::default()
    }
}

/// Runs `tx` on a mainnet EVM over `db` without committing the result.
pub fn transact<DB: Database>(
    db: DB,
    tx: TxEnv,
) -> Result<ResultAndState, EVMError<DB::Error>> {
    let mut evm = Context::mainnet()
        .with_db(db)
        .with_cfg(evm_cfg())
        .with_block(block_env())
        .build_mainnet();
    evm.transact(tx)
}
