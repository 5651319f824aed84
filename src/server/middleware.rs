use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::metrics::HttpMetrics;

/// Count every request by matched route and response status
pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    // Route template rather than raw path to keep label cardinality bounded
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    HttpMetrics::record_request(&endpoint, response.status().as_u16());
    response
}
