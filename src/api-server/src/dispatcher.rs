//! Per-request method filtering, timeout and panic containment
//!
//! Every routed request runs its handler in a separate task. The dispatcher
//! waits for whichever comes first, the handler's result or the timeout.
//! A timed-out handler is not cancelled; it keeps running until it returns
//! and only the dispatcher's own response is affected.

use crate::routes::Route;
use crate::DEFAULT_TIMEOUT;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use garm_core::parse_duration;
use std::time::{Duration, Instant};
use tracing::{error, info_span, warn, Instrument, Span};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Wraps route handlers with method checks and a bounded wait
#[derive(Debug, Clone)]
pub struct Dispatcher {
    timeout: Duration,
    span: Span,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            span: info_span!("dispatcher"),
        }
    }

    /// Build from a configured duration string, falling back to 3s when it does not parse
    pub fn from_config(timeout: &str, span: Span) -> Self {
        let timeout = match parse_duration(timeout) {
            Ok(timeout) => timeout,
            Err(e) => {
                error!(parent: &span, error = %e, "Invalid timeout value: {}", timeout);
                DEFAULT_TIMEOUT
            }
        };
        Self { timeout, span }
    }

    /// Log inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `route` for `request`
    pub async fn dispatch(&self, route: &Route, request: Request) -> Response {
        if !route.allows(request.method()) {
            let method = request.method().clone();
            // drain the body so the connection can be reused, one chunk at a time
            let mut body = request.into_body().into_data_stream();
            while let Some(chunk) = body.next().await {
                if let Err(e) = chunk {
                    error!(parent: &self.span, error = %e, "request body flush & close failed");
                    break;
                }
            }
            return plain_text(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method: {}\t{}\n", method, reason(StatusCode::METHOD_NOT_ALLOWED)),
            );
        }

        let start = Instant::now();
        let handler = route.handler.clone();
        let mut task = tokio::spawn(
            async move { handler(request).await }.instrument(self.span.clone()),
        );

        tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    error!(parent: &self.span, route = route.name, error = %e, "handler error occurred");
                    plain_text(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!(
                            "Error: handler error occurred: {}\t{}\n",
                            e,
                            reason(StatusCode::INTERNAL_SERVER_ERROR)
                        ),
                    )
                }
                Err(e) if e.is_panic() => {
                    error!(parent: &self.span, route = route.name, "recover panic from athenz webhook: {}", panic_message(e));
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
                Err(e) => {
                    error!(parent: &self.span, route = route.name, error = %e, "handler task cancelled");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            },
            _ = tokio::time::sleep(self.timeout) => {
                warn!(
                    parent: &self.span,
                    route = route.name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Handler Time Out"
                );
                // the handler task stays detached and runs to completion
                StatusCode::GATEWAY_TIMEOUT.into_response()
            }
        }
    }
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("")
}

fn plain_text(status: StatusCode, body: String) -> Response {
    let mut response = (status, Body::from(body)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}

fn panic_message(e: tokio::task::JoinError) -> String {
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::routes::{handler_fn, Route};
    use axum::http::Method;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn post(uri: &str, body: &'static str) -> Request {
        axum::http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn route(handler: crate::routes::Handler) -> Route {
        Route::new("Test", vec![Method::POST], "/test", handler)
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_timeout_fallback() {
        assert_eq!(
            Dispatcher::from_config("250ms", Span::none()).timeout(),
            Duration::from_millis(250)
        );
        assert_eq!(Dispatcher::from_config("soon", Span::none()).timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_invalid_timeout_logged_in_given_span() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let dispatcher = Dispatcher::from_config("soon", info_span!("garm_dispatch"));
            assert_eq!(dispatcher.timeout(), DEFAULT_TIMEOUT);
        });

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("Invalid timeout value: soon"))
            .unwrap();
        assert!(line.contains("garm_dispatch"));
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let dispatcher = Dispatcher::new(Duration::from_secs(1));
        let route = route(handler_fn(|_| async { Ok("ok".into_response()) }));

        let request = axum::http::Request::builder()
            .method(Method::PUT)
            .uri("/test")
            .body(Body::from("payload"))
            .unwrap();
        let response = dispatcher.dispatch(&route, request).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_text(response).await, "Method: PUT\tMethod Not Allowed\n");
    }

    #[tokio::test]
    async fn test_method_not_allowed_drains_streamed_body() {
        let dispatcher = Dispatcher::new(Duration::from_secs(1));
        let route = route(handler_fn(|_| async { Ok("ok".into_response()) }));

        let chunks = (0..64).map(|_| Ok::<_, std::io::Error>(axum::body::Bytes::from(vec![b'x'; 1024])));
        let request = axum::http::Request::builder()
            .method(Method::DELETE)
            .uri("/test")
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();
        let response = dispatcher.dispatch(&route, request).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_text(response).await, "Method: DELETE\tMethod Not Allowed\n");
    }

    #[tokio::test]
    async fn test_method_not_allowed_body_error_still_rejected() {
        let dispatcher = Dispatcher::new(Duration::from_secs(1));
        let route = route(handler_fn(|_| async { Ok("ok".into_response()) }));

        let chunks = vec![
            Ok(axum::body::Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let request = axum::http::Request::builder()
            .method(Method::GET)
            .uri("/test")
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();
        let response = dispatcher.dispatch(&route, request).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_handler_response_passes_through() {
        let dispatcher = Dispatcher::new(Duration::from_secs(1));
        let route = route(handler_fn(|_| async { Ok((StatusCode::CREATED, "made").into_response()) }));

        let response = dispatcher.dispatch(&route, post("/test", "")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_text(response).await, "made");
    }

    #[tokio::test]
    async fn test_handler_error_becomes_500() {
        let dispatcher = Dispatcher::new(Duration::from_secs(1));
        let route = route(handler_fn(|_| async {
            Err(ApiError::Internal("boom".to_string()))
        }));

        let response = dispatcher.dispatch(&route, post("/test", "")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_text(response).await,
            "Error: handler error occurred: internal error: boom\tInternal Server Error\n"
        );
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let dispatcher = Dispatcher::new(Duration::from_secs(1));
        let route = route(handler_fn(|_| async {
            if true {
                panic!("handler exploded");
            }
            Ok("unreachable".into_response())
        }));

        let response = dispatcher.dispatch(&route, post("/test", "")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_leaves_handler_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let dispatcher = Dispatcher::new(Duration::from_millis(20));
        let route = route(handler_fn(move |_| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
                Ok("late".into_response())
            }
        }));

        let response = dispatcher.dispatch(&route, post("/test", "")).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(body_text(response).await.is_empty());
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
