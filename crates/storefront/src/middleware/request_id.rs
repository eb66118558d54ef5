//! Request correlation ids.
//!
//! Every request carries an `X-Request-Id`: the one sent by the proxy when
//! it looks sane, otherwise a fresh UUID. The id is recorded on the
//! `http_request` span, tagged on the Sentry scope and echoed back in the
//! response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

/// The HTTP header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest inbound id that is reused rather than replaced.
const MAX_INBOUND_LENGTH: usize = 64;

/// Keep an upstream id made of visible ASCII, else generate one.
fn request_id(value: Option<&HeaderValue>) -> String {
    value
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_INBOUND_LENGTH
                && id.bytes().all(|b| b.is_ascii_graphic())
        })
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned)
}

/// Attach a request id to the span, the Sentry scope and the response.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let id = request_id(request.headers().get(REQUEST_ID_HEADER));

    tracing::Span::current().record("request_id", id.as_str());
    sentry::configure_scope(|scope| scope.set_tag("request_id", &id));

    let mut response = next.run(request).await;
    if let Ok(header) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_id_is_kept() {
        let header = HeaderValue::from_static("cf-7a1b2c");
        assert_eq!(request_id(Some(&header)), "cf-7a1b2c");
    }

    #[test]
    fn test_missing_or_unusable_ids_are_replaced() {
        let too_long = HeaderValue::from_str(&"x".repeat(MAX_INBOUND_LENGTH + 1)).unwrap();
        let spaced = HeaderValue::from_static("two words");

        for header in [None, Some(&too_long), Some(&spaced)] {
            let id = request_id(header);
            assert!(Uuid::parse_str(&id).is_ok(), "{id}");
        }
    }
}
