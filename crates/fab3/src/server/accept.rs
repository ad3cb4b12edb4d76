use core::convert::Infallible;
use std::net::SocketAddr;

use http_body_util::Full;
use hyper::{
    Error,
    Method,
    Request,
    Response,
    StatusCode,
    body::Bytes,
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS,
        ACCESS_CONTROL_ALLOW_METHODS,
        ACCESS_CONTROL_ALLOW_ORIGIN,
        CONTENT_TYPE,
        HeaderValue,
    },
};

use super::{
    Gateway,
    dispatch::handle_request,
};

macro_rules! rpc_response {
    (
        $status:expr,
        $body:expr
    ) => {
        Ok(with_cors($status, Full::new(Bytes::from($body))))
    };
}

/// Builds a response carrying the CORS headers every route answers with.
fn with_cors(status: StatusCode, body: Full<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Origin, Content-Type"),
    );
    response
}

/// Accepts an incoming HTTP request and routes it.
#[tracing::instrument(level = "info", skip_all, target = "fab3::accept_request")]
pub async fn accept_request<B>(
    req: Request<B>,
    gateway: &Gateway,
    client_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Error = Error>,
{
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if method == Method::OPTIONS {
        return rpc_response!(StatusCode::OK, Bytes::new());
    }

    if path == "/health" && method == Method::GET {
        return rpc_response!(StatusCode::OK, "ok");
    }

    if path != "/" {
        return rpc_response!(StatusCode::NOT_FOUND, "not found");
    }
    if method != Method::POST {
        return rpc_response!(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    tracing::debug!(target: "fab3::accept_request", "Incoming request");
    match handle_request(req, gateway, client_addr).await {
        Ok(body) => {
            let mut response = with_cors(StatusCode::OK, Full::new(Bytes::from(body)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(response)
        }
        Err(e) => rpc_response!(StatusCode::BAD_REQUEST, e.to_string()),
    }
}
