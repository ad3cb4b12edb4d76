use std::sync::Arc;

use fab3::{
    EthService,
    Fab3Server,
    FilterRegistry,
    Gateway,
    client::InProcessLedger,
};
use fabric_protos::test_utils::{
    SAMPLE_ADDRESS,
    sample_creator,
};
use serde_json::{
    Value,
    json,
};
use tokio::{
    net::TcpListener,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

// pragma solidity ^0.4.0;
// contract SimpleStorage {
//     uint storedData;
//     function set(uint x) public { storedData = x; }
//     function get() public constant returns (uint) { return storedData; }
// }
const SIMPLE_STORAGE_DEPLOY: &str = "6060604052341561000f57600080fd5b60d38061001d6000396000f3006060604052600436106049576000357c0100000000000000000000000000000000000000000000000000000000900463ffffffff16806360fe47b114604e5780636d4ce63c14606e575b600080fd5b3415605857600080fd5b606c60048080359060200190919050506094565b005b3415607857600080fd5b607e609e565b6040518082815260200191505060405180910390f35b8060008190555050565b600080549050905600a165627a7a72305820122f55f799d70b5f6dbfd4312efb65cdbfaacddedf7c36249b8b1e915a8dd85b0029";
const SIMPLE_STORAGE_INIT_PREFIX: &str = "6060604052341561000f57600080fd5b60d38061001d6000396000f300";
const SET: &str = "60fe47b1";
const GET: &str = "6d4ce63c";

// contract Instructor {
//     event Setter(bytes32 indexed name, uint age, uint salary);
//     function setInstructor(bytes32 name, uint age, uint salary) public;
//     function getInstructor() public constant returns (bytes32, uint, uint);
// }
const INSTRUCTOR_DEPLOY: &str = "608060405234801561001057600080fd5b50610122806100206000396000f30060806040526004361060485763ffffffff7c010000000000000000000000000000000000000000000000000000000060003504166331fb1dff8114604d5780633c1b81a514606a575b600080fd5b348015605857600080fd5b506068600435602435604435609a565b005b348015607557600080fd5b50607c60e8565b60408051938452602084019290925282820152519081900360600190f35b6000839055600182905560028190556040805183815260208101839052815185927fe920a6ca2d94687457e136223552305dbabca6f28cf9c65d18efc2193a2369b0928290030190a2505050565b6000546001546002549091925600a165627a7a723058201f3b3871bfe7762e6fb776ed8b5d5533e07178b576c630cf89a7e63a7b54b57b0029";
const SET_INSTRUCTOR: &str = "31fb1dff";
const SETTER_TOPIC: &str = "e920a6ca2d94687457e136223552305dbabca6f28cf9c65d18efc2193a2369b0";
const SAM: &str = "53616d0000000000000000000000000000000000000000000000000000000000";

// Any call emits LOG1(topic 1) then LOG1(topic 2), both without data.
const DOUBLE_EMITTER_DEPLOY: &str = "600f600c600039600f6000f3600160006000a1600260006000a100";
const EMIT: &str = "12345678";

fn word(value: u64) -> String {
    format!("{value:064x}")
}

struct TestServer {
    url: String,
    client: reqwest::Client,
    cancel_token: CancellationToken,
    handle: JoinHandle<fab3::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let ledger =
            Arc::new(InProcessLedger::new("mychannel", "evmcc", sample_creator()).unwrap());
        let eth = EthService::new(ledger.clone(), ledger, "evmcc", FilterRegistry::default());
        let server = Fab3Server {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            gateway: Gateway::new(eth),
        };
        let url = format!("http://{}", server.local_addr().unwrap());

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(server.run(cancel_token.clone()));
        Self {
            url,
            client: reqwest::Client::new(),
            cancel_token,
            handle,
        }
    }

    async fn post(&self, body: Value) -> reqwest::Response {
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Full JSON-RPC response object.
    async fn rpc(&self, method: &str, params: Value) -> Value {
        self.post(json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1}))
            .await
            .json()
            .await
            .unwrap()
    }

    /// The `result` of a call expected to succeed.
    async fn result(&self, method: &str, params: Value) -> Value {
        let response = self.rpc(method, params).await;
        assert!(
            response.get("error").is_none(),
            "{method} failed: {}",
            response["error"]
        );
        response["result"].clone()
    }

    async fn send(&self, to: Option<&str>, data: &str) -> String {
        let mut args = json!({"data": format!("0x{data}")});
        if let Some(to) = to {
            args["to"] = json!(to);
        }
        self.result("eth_sendTransaction", json!([args]))
            .await
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn receipt(&self, tx_id: &str) -> Value {
        self.result("eth_getTransactionReceipt", json!([format!("0x{tx_id}")]))
            .await
    }

    /// Deploys `code` and returns the `0x` prefixed contract address.
    async fn deploy(&self, code: &str) -> String {
        let tx_id = self.send(None, code).await;
        self.receipt(&tx_id).await["contractAddress"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn set_instructor(&self, contract: &str) -> String {
        let input = format!("{SET_INSTRUCTOR}{SAM}{}{}", word(0x19), word(0x7530));
        self.send(Some(contract), &input).await
    }

    async fn stop(self) {
        self.cancel_token.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn simple_storage_deploy_set_and_get() {
    let server = TestServer::start().await;

    let deploy_tx = server.send(None, SIMPLE_STORAGE_DEPLOY).await;
    assert_eq!(deploy_tx.len(), 64);
    let receipt = server.receipt(&deploy_tx).await;
    assert_eq!(receipt["status"], "0x1");
    assert_eq!(receipt["from"], format!("0x{SAMPLE_ADDRESS}"));
    assert_eq!(receipt["to"], "");
    assert_eq!(receipt["blockNumber"], "0x1");
    let contract = receipt["contractAddress"].as_str().unwrap().to_string();
    assert_eq!(contract.len(), 42);

    server
        .send(Some(&contract), &format!("{SET}{}", word(0x2a)))
        .await;
    let value = server
        .result("eth_call", json!([{"to": contract, "data": format!("0x{GET}")}]))
        .await;
    assert_eq!(value, format!("0x{}", word(0x2a)));

    let code = server.result("eth_getCode", json!([contract, "latest"])).await;
    assert_eq!(
        code,
        SIMPLE_STORAGE_DEPLOY
            .strip_prefix(SIMPLE_STORAGE_INIT_PREFIX)
            .unwrap()
    );

    assert_eq!(server.result("eth_blockNumber", json!([])).await, "0x2");

    server.stop().await;
}

#[tokio::test]
async fn setter_event_reaches_receipt_and_logs() {
    let server = TestServer::start().await;
    let contract = server.deploy(INSTRUCTOR_DEPLOY).await;

    let tx_id = server.set_instructor(&contract).await;
    let receipt = server.receipt(&tx_id).await;
    assert_eq!(receipt["to"], contract);

    let logs = receipt["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["address"], contract);
    assert_eq!(
        logs[0]["topics"],
        json!([format!("0x{SETTER_TOPIC}"), format!("0x{SAM}")])
    );
    assert_eq!(logs[0]["data"], format!("0x{}{}", word(0x19), word(0x7530)));
    assert_eq!(logs[0]["logIndex"], "0x0");
    assert_eq!(logs[0]["transactionHash"], format!("0x{tx_id}"));

    let block = receipt["blockNumber"].clone();
    let fetched = server
        .result("eth_getLogs", json!([{"fromBlock": block, "toBlock": block}]))
        .await;
    assert_eq!(fetched, json!([logs[0]]));

    let by_hash = server
        .result("eth_getLogs", json!([{"blockHash": receipt["blockHash"]}]))
        .await;
    assert_eq!(by_hash, json!([logs[0]]));

    server.stop().await;
}

#[tokio::test]
async fn accounts_report_the_gateway_identity() {
    let server = TestServer::start().await;
    assert_eq!(
        server.result("eth_accounts", json!([])).await,
        json!([format!("0x{SAMPLE_ADDRESS}")])
    );
    assert_eq!(server.result("net_version", json!([])).await, "66616265766d");
    server.stop().await;
}

#[tokio::test]
async fn logs_span_blocks_and_filter_by_address() {
    let server = TestServer::start().await;
    let first = server.deploy(DOUBLE_EMITTER_DEPLOY).await;
    let second = server.deploy(DOUBLE_EMITTER_DEPLOY).await;

    let first_tx = server.send(Some(&first), EMIT).await;
    let second_tx = server.send(Some(&second), EMIT).await;
    let from = server.receipt(&first_tx).await["blockNumber"].clone();
    let to = server.receipt(&second_tx).await["blockNumber"].clone();
    assert_ne!(from, to);

    let all = server
        .result("eth_getLogs", json!([{"fromBlock": from, "toBlock": to}]))
        .await;
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 4);
    let order: Vec<_> = all
        .iter()
        .map(|log| (log["address"].clone(), log["logIndex"].clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            (json!(first), json!("0x0")),
            (json!(first), json!("0x1")),
            (json!(second), json!("0x0")),
            (json!(second), json!("0x1")),
        ]
    );

    let only_first = server
        .result(
            "eth_getLogs",
            json!([{"fromBlock": from, "toBlock": to, "address": first}]),
        )
        .await;
    let only_first = only_first.as_array().unwrap();
    assert_eq!(only_first.len(), 2);
    assert!(only_first.iter().all(|log| log["address"] == first));

    let second_topic = server
        .result(
            "eth_getLogs",
            json!([{"fromBlock": "earliest", "topics": [format!("0x{}", word(2))]}]),
        )
        .await;
    let second_topic = second_topic.as_array().unwrap();
    assert_eq!(second_topic.len(), 2);
    assert!(second_topic.iter().all(|log| log["logIndex"] == "0x1"));

    let either_topic = server
        .result(
            "eth_getLogs",
            json!([{
                "fromBlock": from,
                "toBlock": to,
                "topics": [[format!("0x{}", word(1)), format!("0x{}", word(2))]],
            }]),
        )
        .await;
    assert_eq!(either_topic.as_array().unwrap().len(), 4);

    let reversed = server
        .rpc("eth_getLogs", json!([{"fromBlock": to, "toBlock": from}]))
        .await;
    assert_eq!(reversed["error"]["code"], -32602);

    server.stop().await;
}

#[tokio::test]
async fn malformed_method_has_no_effect() {
    let server = TestServer::start().await;
    let response = server.rpc("someService_fake_method", json!([])).await;
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("malformed method")
    );
    assert_eq!(server.result("eth_blockNumber", json!([])).await, "0x0");
    server.stop().await;
}

#[tokio::test]
async fn responses_carry_cors_headers() {
    let server = TestServer::start().await;
    let response = server
        .post(json!({"jsonrpc": "2.0", "method": "eth_blockNumber", "id": 1}))
        .await;
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "POST");
    assert_eq!(headers["access-control-allow-headers"], "Origin, Content-Type");
    assert_eq!(headers["content-type"], "application/json");

    let preflight = server
        .client
        .request(reqwest::Method::OPTIONS, &server.url)
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 200);
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");

    server.stop().await;
}

#[tokio::test]
async fn batch_requests_answer_in_order() {
    let server = TestServer::start().await;
    let responses: Value = server
        .post(json!([
            {"jsonrpc": "2.0", "method": "net_version", "id": 1},
            {"jsonrpc": "2.0", "method": "eth_estimateGas", "params": [{}], "id": 2},
            {"jsonrpc": "2.0", "method": "eth_nope", "id": 3},
        ]))
        .await
        .json()
        .await
        .unwrap();

    let responses = responses.as_array().unwrap();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["result"], "66616265766d");
    assert_eq!(responses[1]["result"], "0x0");
    assert_eq!(responses[2]["error"]["code"], -32601);
    assert_eq!(responses[2]["id"], 3);

    server.stop().await;
}

#[tokio::test]
async fn blocks_and_transactions_by_number_and_hash() {
    let server = TestServer::start().await;
    let tx_id = server.send(None, SIMPLE_STORAGE_DEPLOY).await;
    let receipt = server.receipt(&tx_id).await;

    let block = server
        .result("eth_getBlockByNumber", json!(["latest", false]))
        .await;
    assert_eq!(block["hash"], receipt["blockHash"]);
    assert_eq!(block["transactions"], json!([format!("0x{tx_id}")]));

    let genesis = server
        .result("eth_getBlockByNumber", json!(["earliest", false]))
        .await;
    assert_eq!(genesis["number"], "0x0");
    assert_eq!(genesis["parentHash"], "0x");

    let full = server
        .result("eth_getBlockByNumber", json!(["0x1", true]))
        .await;
    assert_eq!(full["transactions"][0]["hash"], format!("0x{tx_id}"));
    assert_eq!(
        full["transactions"][0]["input"],
        format!("0x{SIMPLE_STORAGE_DEPLOY}")
    );

    let transaction = server
        .result("eth_getTransactionByHash", json!([format!("0x{tx_id}")]))
        .await;
    assert_eq!(transaction["blockHash"], receipt["blockHash"]);
    assert_eq!(transaction["transactionIndex"], "0x0");
    assert_eq!(transaction["from"], format!("0x{SAMPLE_ADDRESS}"));

    let pending = server
        .rpc("eth_getBlockByNumber", json!(["pending", false]))
        .await;
    assert_eq!(pending["error"]["code"], -32602);

    server.stop().await;
}

#[tokio::test]
async fn filters_report_changes_since_the_last_poll() {
    let server = TestServer::start().await;
    let contract = server.deploy(INSTRUCTOR_DEPLOY).await;

    let block_filter = server.result("eth_newBlockFilter", json!([])).await;
    let log_filter = server
        .result("eth_newFilter", json!([{"address": contract}]))
        .await;
    assert_ne!(block_filter, log_filter);

    let tx_id = server.set_instructor(&contract).await;
    let receipt = server.receipt(&tx_id).await;

    let blocks = server
        .result("eth_getFilterChanges", json!([block_filter]))
        .await;
    assert_eq!(blocks, json!([receipt["blockHash"]]));
    let logs = server
        .result("eth_getFilterChanges", json!([log_filter]))
        .await;
    assert_eq!(logs, receipt["logs"]);

    assert_eq!(
        server
            .result("eth_getFilterChanges", json!([block_filter]))
            .await,
        json!([])
    );

    assert_eq!(
        server.result("eth_uninstallFilter", json!([log_filter])).await,
        json!(true)
    );
    assert_eq!(
        server.result("eth_uninstallFilter", json!([log_filter])).await,
        json!(false)
    );
    let gone = server
        .rpc("eth_getFilterChanges", json!([log_filter]))
        .await;
    assert_eq!(gone["error"]["code"], -32000);

    server.stop().await;
}
