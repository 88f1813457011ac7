//! HTTP transport: `POST /graphql` for operations (subscriptions answered as
//! server-sent events), `GET /graphql` for the SDL, `GET /health`.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use http::HeaderMap;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::engine::GraphEngine;
use crate::types::OperationMode;
use crate::{GraphQLRequest, GraphResponse};

type Body = UnsyncBoxBody<Bytes, hyper::Error>;

/// Credential taken from an `Authorization: Bearer …` header, made available
/// to resolvers through the execution context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BearerToken(pub String);

fn full<T: Into<Bytes>>(value: T) -> Body {
    Full::new(value.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn json_response(status: StatusCode, body: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(full(body))
        .unwrap_or_else(|_| internal_server_error())
}

fn graph_response(response: &GraphResponse) -> Response<Body> {
    let status = StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::OK);
    match serde_json::to_string(response) {
        Ok(body) => json_response(status, body),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize response");
            internal_server_error()
        }
    }
}

fn bad_request(message: String) -> Response<Body> {
    let body = json!({ "errors": [{ "message": message }] }).to_string();
    json_response(StatusCode::BAD_REQUEST, body)
}

async fn handle_request(
    req: Request<Incoming>,
    engine: Arc<GraphEngine>,
) -> Result<Response<Body>, Infallible> {
    let result = match (req.method(), req.uri().path()) {
        (&Method::POST, "/graphql") => {
            let ctx = request_context(req.headers());
            let body_bytes = match req.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => return Ok(bad_request("Failed to read request body".to_string())),
            };
            match serde_json::from_slice::<GraphQLRequest>(&body_bytes) {
                Ok(request) => execute(&engine, ctx, request).await,
                Err(e) => bad_request(format!("Invalid JSON request: {e}")),
            }
        }

        (&Method::GET, "/graphql") => Response::builder()
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Access-Control-Allow-Origin", "*")
            .body(full(engine.schema_definition()))
            .unwrap_or_else(|_| internal_server_error()),

        (&Method::GET, "/health") => {
            json_response(StatusCode::OK, json!({ "status": "ok" }).to_string())
        }

        (&Method::OPTIONS, _) => Response::builder()
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type, Authorization",
            )
            .body(full(""))
            .unwrap_or_else(|_| internal_server_error()),

        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Access-Control-Allow-Origin", "*")
            .body(full("Not Found"))
            .unwrap_or_else(|_| internal_server_error()),
    };

    Ok(result)
}

async fn execute(
    engine: &GraphEngine,
    ctx: ExecutionContext,
    request: GraphQLRequest,
) -> Response<Body> {
    let is_subscription = matches!(
        engine.plan_request(&request).await,
        Ok(plan) if plan.mode == OperationMode::Subscription
    );
    if !is_subscription {
        let response = engine.execute_request(&ctx, request).await;
        return graph_response(&response);
    }

    // Dropping the body (client gone) cancels the subscription.
    let token = CancellationToken::new();
    let ctx = ctx.with_cancellation(token.clone());
    let stream = match engine.subscribe_request(&ctx, request).await {
        Ok(stream) => stream,
        Err(err) => return graph_response(&GraphResponse::request_error(&err)),
    };
    let guard = token.drop_guard();
    let frames = stream.map(move |response| {
        let _guard = &guard;
        let payload = serde_json::to_string(&response).unwrap_or_default();
        Ok::<_, hyper::Error>(Frame::data(Bytes::from(format!("data: {payload}\n\n"))))
    });
    Response::builder()
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(StreamBody::new(frames).boxed_unsync())
        .unwrap_or_else(|_| internal_server_error())
}

fn internal_server_error() -> Response<Body> {
    let mut response = Response::new(full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Builds the per-request context, carrying the bearer token if any.
fn request_context(headers: &HeaderMap) -> ExecutionContext {
    let ctx = ExecutionContext::new();
    match bearer_token(headers) {
        Some(token) => ctx.with_value(BearerToken(token)),
        None => ctx,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[derive(Clone)]
// An Executor that uses the tokio runtime.
pub struct TokioExecutor;

impl<F> hyper::rt::Executor<F> for TokioExecutor
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::task::spawn(fut);
    }
}

/// Accepts connections on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, engine: Arc<GraphEngine>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "quickgraph listening");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let engine = Arc::clone(&engine);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, engine.clone()));

            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor)
                .serve_connection(io, service)
                .await
            {
                tracing::debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn extracts_bearer_tokens() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer admin-token"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("admin-token"));
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc"),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn request_context_carries_the_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer user-token"),
        );
        let ctx = request_context(&headers);
        assert_eq!(
            ctx.value::<BearerToken>(),
            Some(&BearerToken("user-token".to_string()))
        );
    }
}
