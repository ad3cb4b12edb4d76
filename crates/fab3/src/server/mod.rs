//! # `server`
//!
//! HTTP front of the gateway. `POST /` carries JSON-RPC 2.0, single
//! requests or batches, with methods named `<service>_<method>`.
//!
//! ```json
//! {
//!     "jsonrpc": "2.0",
//!     "method": "eth_getTransactionReceipt",
//!     "params": ["0x5a1c..."],
//!     "id": 1
//! }
//! ```
//!
//! `GET /health` answers `ok` and `OPTIONS` answers the CORS pre-flight.
//!
//! ## Error Codes
//!
//! - -32700: Body is not JSON
//! - -32600: Invalid request, oversized body or malformed method name
//! - -32601: Method not found
//! - -32602: Invalid parameters
//! - -32603: Internal error, including ledger and EVM failures
//! - -32000: Filter not found

pub mod accept;
pub mod dispatch;

use std::net::SocketAddr;

use hyper_util::rt::TokioIo;
use tokio::net::{
    TcpListener,
    TcpStream,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    eth::EthService,
    net::NetService,
};

/// The RPC services shared by every connection.
#[derive(Clone)]
pub struct Gateway {
    pub eth: EthService,
    pub net: NetService,
}

impl Gateway {
    pub fn new(eth: EthService) -> Self {
        Self {
            eth,
            net: NetService,
        }
    }
}

/// A bound gateway, ready to serve.
pub struct Fab3Server {
    pub listener: TcpListener,
    pub gateway: Gateway,
}

impl Fab3Server {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, cancel_token: CancellationToken) -> Result<()> {
        serve(self.listener, self.gateway, cancel_token).await
    }
}

/// Serves the gateway on `listener` until `cancel_token` fires.
///
/// The filter reaper runs alongside and stops with the same token.
pub async fn serve(
    listener: TcpListener,
    gateway: Gateway,
    cancel_token: CancellationToken,
) -> Result<()> {
    tokio::spawn(
        gateway
            .eth
            .filters()
            .clone()
            .run_reaper(cancel_token.clone()),
    );

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                tracing::info!("Server received cancellation signal, shutting down...");
                break;
            }
            res = listener.accept() => {
                match res {
                    Ok((stream, socketaddr)) => {
                        serve_connection(socketaddr, gateway.clone(), stream);
                    }
                    Err(err) => {
                        tracing::error!(?err, "Error accepting connection");
                    }
                }
            }
        }
    }

    Ok(())
}

fn serve_connection(socketaddr: SocketAddr, gateway: Gateway, stream: TcpStream) {
    tracing::debug!("Connection from: {}", socketaddr);

    // Adapts the tokio stream to hyper's IO traits.
    let io = TokioIo::new(stream);

    tokio::task::spawn(async move {
        if let Err(err) = hyper::server::conn::http1::Builder::new()
            .serve_connection(
                io,
                hyper::service::service_fn(move |req| {
                    let gateway = gateway.clone();
                    async move { accept::accept_request(req, &gateway, socketaddr).await }
                }),
            )
            .await
        {
            tracing::error!(?err, "Error serving connection");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::InProcessLedger,
        filters::FilterRegistry,
    };
    use fabric_protos::test_utils::sample_creator;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_serve() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let ledger = Arc::new(InProcessLedger::new("ch", "evmcc", sample_creator()).unwrap());
        let eth = EthService::new(ledger.clone(), ledger, "evmcc", FilterRegistry::default());

        let cancel_token = CancellationToken::new();
        let server_handle = tokio::spawn(serve(listener, Gateway::new(eth), cancel_token.clone()));

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{addr}"))
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": "eth_blockNumber",
                "params": [],
                "id": 1
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["result"], "0x0");

        let health_response = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(health_response.status(), 200);
        assert_eq!(health_response.text().await.unwrap(), "ok");

        cancel_token.cancel();
        server_handle.await.unwrap().unwrap();
    }
}
