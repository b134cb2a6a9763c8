//! # Request/Response Tracing
//!
//! `tower_http::trace::TraceLayer` giving each request a span with method,
//! URI, and response status.

pub fn layer() -> tower_http::trace::TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
> {
    tower_http::trace::TraceLayer::new_for_http()
}
