//! Dual-listener lifecycle
//!
//! The gateway runs two listeners side by side: the traffic listener serving
//! the webhook routes, and the liveness listener answering health probes.
//! Both start together. Whichever happens first of external cancellation,
//! traffic termination, or liveness termination decides a single shutdown
//! round:
//!
//! - cancellation stops liveness, then traffic
//! - traffic terminating stops liveness
//! - liveness terminating stops traffic
//!
//! Stopping traffic waits the probe delay first so external health checks
//! see the liveness listener go away before traffic is refused. Every stop
//! is bounded by the shutdown deadline, after which open connections are
//! closed.

use crate::error::ServerError;
use crate::{DEFAULT_PROBE_WAIT, DEFAULT_SHUTDOWN_DURATION};
use async_trait::async_trait;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use garm_core::parse_duration_or;
use parking_lot::RwLock;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Span};

/// A long-running listener driven by [`ServiceLifecycle`]
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Serve until stopped or failed
    async fn serve(&self) -> Result<(), ServerError>;

    /// Stop accepting and let in-flight requests finish
    fn shutdown(&self);

    /// Close every open connection immediately
    fn force_close(&self);
}

/// Axum router bound to a socket, optionally behind TLS
pub struct AxumListener {
    name: String,
    addr: SocketAddr,
    router: Router,
    tls: Option<RustlsConfig>,
    handle: Handle,
}

impl AxumListener {
    pub fn new(name: impl Into<String>, addr: SocketAddr, router: Router) -> Self {
        Self {
            name: name.into(),
            addr,
            router,
            tls: None,
            handle: Handle::new(),
        }
    }

    /// Serve over TLS with the given server configuration
    pub fn with_tls(mut self, config: rustls::ServerConfig) -> Self {
        self.tls = Some(RustlsConfig::from_config(Arc::new(config)));
        self
    }

    /// Bound address once the listener is accepting; `None` if binding failed
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }
}

#[async_trait]
impl Listener for AxumListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn serve(&self) -> Result<(), ServerError> {
        let service = self.router.clone().into_make_service();
        let result = match &self.tls {
            Some(tls) => {
                axum_server::bind_rustls(self.addr, tls.clone())
                    .handle(self.handle.clone())
                    .serve(service)
                    .await
            }
            None => {
                axum_server::bind(self.addr)
                    .handle(self.handle.clone())
                    .serve(service)
                    .await
            }
        };

        result.map_err(|source| ServerError::Serve {
            listener: self.name.clone(),
            source,
        })
    }

    fn shutdown(&self) {
        self.handle.graceful_shutdown(None);
    }

    fn force_close(&self) {
        self.handle.shutdown();
    }
}

/// Which of the two listeners an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Traffic,
    Liveness,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::Traffic => write!(f, "traffic"),
            ListenerKind::Liveness => write!(f, "liveness"),
        }
    }
}

#[derive(Debug, Default)]
struct RunningState {
    traffic: bool,
    liveness: bool,
}

impl RunningState {
    fn flag(&mut self, kind: ListenerKind) -> &mut bool {
        match kind {
            ListenerKind::Traffic => &mut self.traffic,
            ListenerKind::Liveness => &mut self.liveness,
        }
    }

    fn is_running(&self, kind: ListenerKind) -> bool {
        match kind {
            ListenerKind::Traffic => self.traffic,
            ListenerKind::Liveness => self.liveness,
        }
    }
}

type Done = oneshot::Receiver<Result<(), ServerError>>;

enum FirstEvent {
    Cancelled,
    Terminated(ListenerKind, Result<Result<(), ServerError>, oneshot::error::RecvError>),
}

/// Owns the traffic and liveness listeners and coordinates their shutdown
pub struct ServiceLifecycle {
    traffic: Arc<dyn Listener>,
    liveness: Arc<dyn Listener>,
    state: Arc<RwLock<RunningState>>,
    probe_delay: Duration,
    shutdown_deadline: Duration,
    span: Span,
}

impl ServiceLifecycle {
    pub fn new(traffic: Arc<dyn Listener>, liveness: Arc<dyn Listener>) -> Self {
        Self {
            traffic,
            liveness,
            state: Arc::new(RwLock::new(RunningState::default())),
            probe_delay: DEFAULT_PROBE_WAIT,
            shutdown_deadline: DEFAULT_SHUTDOWN_DURATION,
            span: info_span!("lifecycle"),
        }
    }

    /// Apply configured durations; malformed values fall back to defaults
    pub fn with_durations(mut self, shutdown_duration: &str, probe_wait_time: &str) -> Self {
        self.shutdown_deadline = parse_duration_or(shutdown_duration, DEFAULT_SHUTDOWN_DURATION);
        self.probe_delay = parse_duration_or(probe_wait_time, DEFAULT_PROBE_WAIT);
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn probe_delay(&self) -> Duration {
        self.probe_delay
    }

    pub fn shutdown_deadline(&self) -> Duration {
        self.shutdown_deadline
    }

    /// Whether the given listener is currently serving
    pub fn is_running(&self, kind: ListenerKind) -> bool {
        self.state.read().is_running(kind)
    }

    /// Run both listeners until the first terminating event, then shut down
    ///
    /// Returns every error observed: the terminating listener's own error or
    /// [`ServerError::Cancelled`], followed by any shutdown failures. An empty
    /// list only happens when a listener stopped cleanly on its own.
    pub async fn run(self, cancel: CancellationToken) -> Vec<ServerError> {
        let (traffic_started, mut traffic_done) = self.spawn(ListenerKind::Traffic);
        let (liveness_started, mut liveness_done) = self.spawn(ListenerKind::Liveness);

        let _ = traffic_started.await;
        let _ = liveness_started.await;
        info!(parent: &self.span, "traffic and liveness listeners started");

        let first = tokio::select! {
            _ = cancel.cancelled() => FirstEvent::Cancelled,
            result = &mut traffic_done => FirstEvent::Terminated(ListenerKind::Traffic, result),
            result = &mut liveness_done => FirstEvent::Terminated(ListenerKind::Liveness, result),
        };

        let mut errors = Vec::new();
        match first {
            FirstEvent::Cancelled => {
                info!(parent: &self.span, "shutdown requested");
                self.stop(ListenerKind::Liveness, liveness_done, &mut errors).await;
                self.stop(ListenerKind::Traffic, traffic_done, &mut errors).await;
                errors.push(ServerError::Cancelled);
            }
            FirstEvent::Terminated(kind, result) => {
                let mut reported = Vec::new();
                self.collect(kind, result, &mut reported);
                match reported.first() {
                    Some(e) => error!(parent: &self.span, listener = %kind, error = %e, "listener terminated"),
                    None => warn!(parent: &self.span, listener = %kind, "listener stopped unexpectedly"),
                }
                errors.append(&mut reported);

                match kind {
                    ListenerKind::Traffic => {
                        self.stop(ListenerKind::Liveness, liveness_done, &mut errors).await
                    }
                    ListenerKind::Liveness => {
                        self.stop(ListenerKind::Traffic, traffic_done, &mut errors).await
                    }
                }
            }
        }

        info!(parent: &self.span, errors = errors.len(), "listeners stopped");
        errors
    }

    fn listener(&self, kind: ListenerKind) -> &Arc<dyn Listener> {
        match kind {
            ListenerKind::Traffic => &self.traffic,
            ListenerKind::Liveness => &self.liveness,
        }
    }

    fn spawn(&self, kind: ListenerKind) -> (oneshot::Receiver<()>, Done) {
        let (started_tx, started_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let listener = Arc::clone(self.listener(kind));
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            *state.write().flag(kind) = true;
            let _ = started_tx.send(());

            let result = listener.serve().await;

            *state.write().flag(kind) = false;
            let _ = done_tx.send(result);
        });

        (started_rx, done_rx)
    }

    /// Stop one listener; a listener that already stopped is left alone
    async fn stop(&self, kind: ListenerKind, done: Done, errors: &mut Vec<ServerError>) {
        let running = self.state.read().is_running(kind);
        if !running {
            let result = done.await;
            self.collect(kind, result, errors);
            return;
        }

        if kind == ListenerKind::Traffic && !self.probe_delay.is_zero() {
            info!(parent: &self.span, delay = ?self.probe_delay, "waiting for probes before stopping traffic");
            tokio::time::sleep(self.probe_delay).await;
        }

        let listener = self.listener(kind);
        info!(parent: &self.span, listener = %kind, "stopping listener");
        listener.shutdown();

        match tokio::time::timeout(self.shutdown_deadline, done).await {
            Ok(result) => self.collect(kind, result, errors),
            Err(_) => {
                warn!(
                    parent: &self.span,
                    listener = %kind,
                    deadline = ?self.shutdown_deadline,
                    "graceful shutdown timed out, closing connections"
                );
                listener.force_close();
                errors.push(ServerError::ShutdownDeadline {
                    listener: kind.to_string(),
                    deadline: self.shutdown_deadline,
                });
            }
        }
    }

    fn collect(
        &self,
        kind: ListenerKind,
        result: Result<Result<(), ServerError>, oneshot::error::RecvError>,
        errors: &mut Vec<ServerError>,
    ) {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(e),
            Err(_) => errors.push(ServerError::Aborted {
                listener: kind.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct MockListener {
        name: &'static str,
        stop: Notify,
        crash: Notify,
        hang: AtomicBool,
        shutdowns: AtomicUsize,
        force_closes: AtomicUsize,
    }

    impl MockListener {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                ..Default::default()
            })
        }

        fn hanging(name: &'static str) -> Arc<Self> {
            let listener = Self::new(name);
            listener.hang.store(true, Ordering::SeqCst);
            listener
        }

        fn shutdowns(&self) -> usize {
            self.shutdowns.load(Ordering::SeqCst)
        }

        fn force_closes(&self) -> usize {
            self.force_closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Listener for MockListener {
        fn name(&self) -> &str {
            self.name
        }

        async fn serve(&self) -> Result<(), ServerError> {
            tokio::select! {
                _ = self.stop.notified() => Ok(()),
                _ = self.crash.notified() => Err(ServerError::Serve {
                    listener: self.name.to_string(),
                    source: io::Error::new(io::ErrorKind::Other, "listener crashed"),
                }),
            }
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if !self.hang.load(Ordering::SeqCst) {
                self.stop.notify_one();
            }
        }

        fn force_close(&self) {
            self.force_closes.fetch_add(1, Ordering::SeqCst);
            self.stop.notify_one();
        }
    }

    fn lifecycle(traffic: &Arc<MockListener>, liveness: &Arc<MockListener>) -> ServiceLifecycle {
        ServiceLifecycle::new(traffic.clone(), liveness.clone())
            .with_probe_delay(Duration::from_millis(10))
            .with_shutdown_deadline(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_cancel_stops_each_listener_once() {
        let traffic = MockListener::new("traffic");
        let liveness = MockListener::new("liveness");
        let cancel = CancellationToken::new();

        let run = tokio::spawn(lifecycle(&traffic, &liveness).run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let errors = run.await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ServerError::Cancelled));
        assert_eq!(traffic.shutdowns(), 1);
        assert_eq!(liveness.shutdowns(), 1);
        assert_eq!(traffic.force_closes(), 0);
    }

    #[tokio::test]
    async fn test_traffic_crash_stops_liveness_only() {
        let traffic = MockListener::new("traffic");
        let liveness = MockListener::new("liveness");

        let run = tokio::spawn(lifecycle(&traffic, &liveness).run(CancellationToken::new()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        traffic.crash.notify_one();

        let errors = run.await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ServerError::Serve { listener, .. } if listener == "traffic"));
        assert_eq!(liveness.shutdowns(), 1);
        assert_eq!(traffic.shutdowns(), 0);
    }

    #[tokio::test]
    async fn test_liveness_crash_stops_traffic() {
        let traffic = MockListener::new("traffic");
        let liveness = MockListener::new("liveness");

        let run = tokio::spawn(lifecycle(&traffic, &liveness).run(CancellationToken::new()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        liveness.crash.notify_one();

        let errors = run.await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ServerError::Serve { listener, .. } if listener == "liveness"));
        assert_eq!(traffic.shutdowns(), 1);
        assert_eq!(liveness.shutdowns(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_deadline_forces_close() {
        let traffic = MockListener::hanging("traffic");
        let liveness = MockListener::new("liveness");
        let cancel = CancellationToken::new();

        let run = tokio::spawn(lifecycle(&traffic, &liveness).run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let errors = run.await.unwrap();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            ServerError::ShutdownDeadline { listener, .. } if listener == "traffic"
        ));
        assert!(matches!(errors[1], ServerError::Cancelled));
        assert_eq!(traffic.force_closes(), 1);
        assert_eq!(liveness.force_closes(), 0);
    }

    #[test]
    fn test_durations_fall_back() {
        let traffic = MockListener::new("traffic");
        let liveness = MockListener::new("liveness");

        let lifecycle = ServiceLifecycle::new(traffic.clone(), liveness.clone())
            .with_durations("not-a-duration", "1s");
        assert_eq!(lifecycle.shutdown_deadline(), DEFAULT_SHUTDOWN_DURATION);
        assert_eq!(lifecycle.probe_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_axum_listener_graceful_shutdown() {
        let router = crate::health::health_router("/healthz");
        let listener = Arc::new(AxumListener::new(
            "liveness",
            "127.0.0.1:0".parse().unwrap(),
            router,
        ));

        let serving = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.serve().await })
        };

        assert!(listener.local_addr().await.is_some());
        listener.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
