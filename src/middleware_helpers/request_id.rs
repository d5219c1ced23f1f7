use crate::tracing::RequestId;
use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

/// Header name for the request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Reuses a well-formed inbound `x-request-id`, otherwise mints one.
fn resolve_request_id(request: &Request) -> (RequestId, HeaderValue) {
    let inbound = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .and_then(|v| v.to_str().ok().map(|s| (RequestId::new(s), v.clone())));

    match inbound {
        Some(pair) => pair,
        None => {
            let id = RequestId::default();
            // uuid text is always a valid header value
            let value = HeaderValue::from_str(id.as_str())
                .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
            (id, value)
        }
    }
}

/// Middleware to add request ID to every request and response
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let (request_id, header_value) = resolve_request_id(&request);
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    request
        .headers_mut()
        .insert(header_name.clone(), header_value.clone());
    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = crate::tracing::scope_request_id(request_id, next.run(request))
        .instrument(span)
        .await;

    response.headers_mut().insert(header_name, header_value);
    response
}
