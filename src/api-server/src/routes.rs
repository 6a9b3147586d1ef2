//! Route table for the traffic listener

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::{handlers, middleware, state::AppState};
use axum::{
    extract::Request,
    http::Method,
    middleware as axum_middleware,
    response::Response,
    routing::any,
    Router,
};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Authentication (TokenReview) endpoint
pub const AUTHN_PATH: &str = "/authn";

/// Authorization (SubjectAccessReview) endpoint
pub const AUTHZ_PATH: &str = "/authz";

pub type HandlerFuture = BoxFuture<'static, Result<Response>>;

/// A route handler; it owns the request and produces the full response
pub type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

/// Wrap an async function as a [`Handler`]
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |request| f(request).boxed())
}

/// One routed endpoint
#[derive(Clone)]
pub struct Route {
    pub name: &'static str,
    pub methods: Vec<Method>,
    pub pattern: &'static str,
    pub handler: Handler,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl Route {
    pub fn new(
        name: &'static str,
        methods: Vec<Method>,
        pattern: &'static str,
        handler: Handler,
    ) -> Self {
        Self {
            name,
            methods,
            pattern,
            handler,
        }
    }

    /// Case-insensitive method check
    pub fn allows(&self, method: &Method) -> bool {
        self.methods
            .iter()
            .any(|m| m.as_str().eq_ignore_ascii_case(method.as_str()))
    }
}

/// The authentication and authorization routes, POST only
pub fn webhook_routes(state: Arc<AppState>) -> Vec<Route> {
    let authn_state = Arc::clone(&state);
    let authz_state = state;

    vec![
        Route::new(
            "Authenticate",
            vec![Method::POST],
            AUTHN_PATH,
            handler_fn(move |request| handlers::authenticate(Arc::clone(&authn_state), request)),
        ),
        Route::new(
            "Authorize",
            vec![Method::POST],
            AUTHZ_PATH,
            handler_fn(move |request| handlers::authorize(Arc::clone(&authz_state), request)),
        ),
    ]
}

/// Build the traffic router: every route goes through `dispatcher`
///
/// `trace` adds per-request HTTP traces.
pub fn create_router(routes: Vec<Route>, dispatcher: Dispatcher, trace: bool) -> Router {
    let dispatcher = Arc::new(dispatcher);

    let mut router = Router::new();
    for route in routes {
        let pattern = route.pattern;
        let route = Arc::new(route);
        let dispatcher = Arc::clone(&dispatcher);
        router = router.route(
            pattern,
            any(move |request: Request| {
                let route = Arc::clone(&route);
                let dispatcher = Arc::clone(&dispatcher);
                async move { dispatcher.dispatch(&route, request).await }
            }),
        );
    }

    let mut router = router
        .layer(CatchPanicLayer::new())
        .layer(axum_middleware::from_fn(middleware::request_id_middleware));
    if trace {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}
