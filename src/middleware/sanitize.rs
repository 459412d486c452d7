//! Generic inbound request hygiene.
//!
//! Cheap shape checks that run before any parsing: control bytes in the
//! path, absurd header sets. The body size cap is enforced separately via
//! `DefaultBodyLimit` on the router.

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

const MAX_HEADER_COUNT: usize = 100;
const MAX_HEADER_VALUE_LEN: usize = 8192;

pub async fn sanitize_middleware(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path();
    if path.chars().any(|c| c.is_control()) || path.contains("%00") {
        return ApiError::Validation("Il percorso contiene caratteri non validi".to_string())
            .into_response();
    }

    if request.headers().len() > MAX_HEADER_COUNT {
        return ApiError::Validation("Numero di header eccessivo".to_string()).into_response();
    }

    for value in request.headers().values() {
        if value.len() > MAX_HEADER_VALUE_LEN {
            return ApiError::Validation("Valore di header troppo lungo".to_string())
                .into_response();
        }
    }

    next.run(request).await
}
