use std::net::SocketAddr;

use futures::future::join_all;
use http_body_util::BodyExt;
use hyper::{
    Error,
    Request,
};
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;
use tracing::{
    debug,
    warn,
};

use super::Gateway;
use crate::{
    codec::{
        JsonRpcError,
        JsonRpcRequest,
        JsonRpcResponse,
        dispatch_name,
    },
    error::{
        Fab3Error,
        JsonRpcErrorCode,
    },
    types::{
        EthArgs,
        GetLogsArgs,
    },
};

/// Largest request body accepted.
pub const MAX_JSON_SIZE: usize = 10 * 1024 * 1024;

const ENCODE_FAILURE: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"failed to encode response"},"id":null}"#;

/// Reads the body of a `POST /` and answers it.
#[tracing::instrument(
    level = "debug",
    skip_all,
    target = "fab3::dispatch",
    fields(client_addr)
)]
pub async fn handle_request<B>(
    req: Request<B>,
    gateway: &Gateway,
    client_addr: SocketAddr,
) -> Result<String, Error>
where
    B: hyper::body::Body<Error = Error>,
{
    tracing::Span::current().record("client_addr", tracing::field::display(&client_addr));
    let body = req.into_body().collect().await?.to_bytes();
    Ok(handle_body(&body, gateway).await)
}

/// Answers a raw JSON-RPC payload, either one request or a batch.
pub async fn handle_body(body: &[u8], gateway: &Gateway) -> String {
    if body.len() > MAX_JSON_SIZE {
        warn!(target: "fab3::dispatch", size = body.len(), "Request payload too large");
        return encode(&JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::new(JsonRpcErrorCode::InvalidRequest, "Request too large"),
        ));
    }

    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(target: "fab3::dispatch", error = %e, "Failed to parse JSON");
            return encode(&JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(JsonRpcErrorCode::ParseError, format!("Parse error: {e}")),
            ));
        }
    };

    match value {
        Value::Array(batch) if batch.is_empty() => {
            encode(&JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(JsonRpcErrorCode::InvalidRequest, "empty batch"),
            ))
        }
        Value::Array(batch) => {
            debug!(target: "fab3::dispatch", size = batch.len(), "Batch request");
            let responses =
                join_all(batch.into_iter().map(|request| handle_value(request, gateway))).await;
            encode(&responses)
        }
        request => encode(&handle_value(request, gateway).await),
    }
}

async fn handle_value(value: Value, gateway: &Gateway) -> JsonRpcResponse {
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return JsonRpcResponse::failure(
                id,
                JsonRpcError::new(
                    JsonRpcErrorCode::InvalidRequest,
                    format!("Invalid request: {e}"),
                ),
            );
        }
    };

    let Some(name) = dispatch_name(&request.method) else {
        warn!(target: "fab3::dispatch", method = %request.method, "Rejected malformed method");
        return JsonRpcResponse::failure(
            request.id,
            JsonRpcError::new(
                JsonRpcErrorCode::InvalidRequest,
                format!("malformed method: {}", request.method),
            ),
        );
    };

    debug!(target: "fab3::dispatch", method = %request.method, "Dispatching");
    match call(&name, &request, gateway).await {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(error) => {
            debug!(
                target: "fab3::dispatch",
                method = %request.method,
                code = error.code,
                message = %error.message,
                "Request failed"
            );
            JsonRpcResponse::failure(request.id, error)
        }
    }
}

async fn call(
    name: &str,
    request: &JsonRpcRequest,
    gateway: &Gateway,
) -> Result<Value, JsonRpcError> {
    let params = request.params();
    let eth = &gateway.eth;

    match name {
        "eth.GetCode" => to_result(eth.get_code(&param::<String>(params, 0)?).await?),
        "eth.Call" => to_result(eth.call(&param::<EthArgs>(params, 0)?).await?),
        "eth.SendTransaction" => {
            to_result(eth.send_transaction(&param::<EthArgs>(params, 0)?).await?)
        }
        "eth.GetTransactionReceipt" => {
            to_result(
                eth.get_transaction_receipt(&param::<String>(params, 0)?)
                    .await?,
            )
        }
        "eth.Accounts" => to_result(eth.accounts().await?),
        "eth.EstimateGas" => to_result(eth.estimate_gas()),
        "eth.GetBalance" => to_result(eth.get_balance()),
        "eth.GetTransactionCount" => to_result(eth.get_transaction_count()),
        "eth.BlockNumber" => to_result(eth.block_number().await?),
        "eth.GetBlockByNumber" => to_result(eth.get_block_by_number(params).await?),
        "eth.GetTransactionByHash" => {
            to_result(
                eth.get_transaction_by_hash(&param::<String>(params, 0)?)
                    .await?,
            )
        }
        "eth.GetLogs" => to_result(eth.get_logs(&optional_param::<GetLogsArgs>(params, 0)?).await?),
        "eth.NewFilter" => {
            to_result(
                eth.new_filter(optional_param::<GetLogsArgs>(params, 0)?)
                    .await?,
            )
        }
        "eth.NewBlockFilter" => to_result(eth.new_block_filter().await?),
        "eth.GetFilterChanges" => {
            to_result(
                eth.get_filter_changes(&param::<String>(params, 0)?)
                    .await?,
            )
        }
        "eth.UninstallFilter" => to_result(eth.uninstall_filter(&param::<String>(params, 0)?)?),
        "net.Version" => to_result(gateway.net.version()),
        _ => {
            Err(JsonRpcError::new(
                JsonRpcErrorCode::MethodNotFound,
                format!("the method {} does not exist/is not available", request.method),
            ))
        }
    }
}

fn param<T: DeserializeOwned>(params: &[Value], index: usize) -> Result<T, Fab3Error> {
    let value = params
        .get(index)
        .ok_or_else(|| Fab3Error::malformed(format!("missing parameter {index}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| Fab3Error::malformed(format!("invalid parameter {index}: {e}")))
}

/// Like [`param`], a missing or null parameter is the default value.
fn optional_param<T: DeserializeOwned + Default>(
    params: &[Value],
    index: usize,
) -> Result<T, Fab3Error> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(_) => param(params, index),
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| {
        JsonRpcError::new(
            JsonRpcErrorCode::InternalError,
            format!("failed to encode result: {e}"),
        )
    })
}

fn encode<T: Serialize>(response: &T) -> String {
    serde_json::to_string(response).unwrap_or_else(|_| ENCODE_FAILURE.to_string())
}
