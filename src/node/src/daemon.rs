//! Component wiring and run loop

use crate::config::Config;
use crate::logging::TraceToggles;
use anyhow::{Context, Result};
use garm_api_server::health::health_router;
use garm_api_server::routes::webhook_routes;
use garm_api_server::tls::build_server_config;
use garm_api_server::{
    create_router, AppState, AthenzClient, AxumListener, Dispatcher, ServerError,
    ServiceLifecycle,
};
use garm_authz::{AthenzResourceMapper, AthenzUserMapper, Resolver};
use garm_token::TokenManager;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Span};

/// The assembled gateway: credential refresher plus both listeners
pub struct Daemon {
    tokens: Arc<TokenManager>,
    lifecycle: ServiceLifecycle,
    span: Span,
}

impl Daemon {
    pub fn new(config: &Config) -> Result<Self> {
        let span = info_span!("garm");
        let toggles = TraceToggles::parse(&config.logger.trace);

        let tokens = Arc::new(
            TokenManager::from_config(&config.token)
                .context("token service instantiate failed")?
                .with_span(info_span!(parent: &span, "token")),
        );

        let resolver = Resolver::new(config.map_rule.tld.platform.clone())
            .context("invalid mapping rules")?;
        let resource_mapper =
            AthenzResourceMapper::new(Arc::new(resolver)).with_trace(toggles.mapping);
        let user_mapper = AthenzUserMapper::new(config.map_rule.user_groups.clone());

        let policy = AthenzClient::new(&config.athenz)
            .context("athenz service instantiate failed")?
            .with_trace(toggles.athenz);

        let state = Arc::new(AppState::new(
            Arc::new(resource_mapper),
            Arc::new(user_mapper),
            Arc::new(policy),
            Arc::clone(&tokens),
        ));

        let dispatcher = Dispatcher::from_config(
            &config.server.timeout,
            info_span!(parent: &span, "dispatcher"),
        );
        let router = create_router(webhook_routes(state), dispatcher, toggles.server);

        let mut traffic = AxumListener::new("traffic", any_addr(config.server.port), router);
        if let Some(tls) =
            build_server_config(&config.server.tls).context("failed to load tls configuration")?
        {
            traffic = traffic.with_tls(tls);
        }

        let liveness = AxumListener::new(
            "liveness",
            any_addr(config.server.health_check_port),
            health_router(&config.server.health_check_path),
        );

        let lifecycle = ServiceLifecycle::new(Arc::new(traffic), Arc::new(liveness))
            .with_durations(
                &config.server.shutdown_duration,
                &config.server.probe_wait_time,
            )
            .with_span(info_span!(parent: &span, "lifecycle"));

        Ok(Self {
            tokens,
            lifecycle,
            span,
        })
    }

    /// Refresh credentials and serve until `cancel` fires or a listener stops
    pub async fn run(self, cancel: CancellationToken) -> Vec<ServerError> {
        let Self {
            tokens,
            lifecycle,
            span,
        } = self;
        info!(parent: &span, "starting garm daemon");

        let refresher_cancel = cancel.child_token();
        let refresher = tokens.start(refresher_cancel.clone());

        let errors = lifecycle.run(cancel).await;

        refresher_cancel.cancel();
        if let Err(e) = refresher.await {
            warn!(parent: &span, error = %e, "token refresher ended abnormally");
        }
        errors
    }
}

fn any_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Resolves with the name of the first SIGINT or SIGTERM received
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
}
