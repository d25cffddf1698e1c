use std::collections::HashSet;
use std::sync::Arc;

use clap::Parser;
use gwchannels::policy::{GroupPolicy, GroupPolicyMode};
use gwchannels::{Channel, Dispatcher, InboxError};
use gwcore::{GatewayConfig, TelegramConfig};
use gwhooks::HookEngine;
use gwrouter::{DispatcherSender, Router};
use gwsessions::SessionStore;
use gwtelegram::TelegramPoller;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod echo_agent;

/// Multi-channel chat-agent gateway.
#[derive(Parser, Debug)]
#[command(name = "gwgateway")]
struct Args {
    /// Path to the gateway TOML config. Falls back to GATEWAY_CONFIG and
    /// then ~/.gateway/gateway.toml when omitted.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = GatewayConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("config load failed ({e}), using defaults");
        GatewayConfig::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.env_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dispatcher = Arc::new(Dispatcher::new());

    let mut telegram_ctx = None;
    if let Some(telegram_config) = &config.telegram {
        let poller = Arc::new(TelegramPoller::new(telegram_config));
        dispatcher.register(poller.clone() as Arc<dyn Channel>).await?;
        let ctx = CancellationToken::new();
        let run_ctx = ctx.clone();
        let run_poller = poller.clone();
        tokio::spawn(async move { run_poller.run(run_ctx).await });
        telegram_ctx = Some(ctx);
        info!("telegram adapter registered");
    } else {
        info!("no telegram config supplied, running without channel adapters");
    }

    let store = Arc::new(SessionStore::new(config.router.max_sessions));
    let hooks = Arc::new(HookEngine::new());
    let group_policy = build_group_policy(config.telegram.as_ref());
    let agent_factory = Arc::new(echo_agent::EchoAgentFactory);
    let response_sender = Arc::new(DispatcherSender(dispatcher.clone()));

    let router = Arc::new(Router::new(
        config.router.clone(),
        store,
        dispatcher.clone(),
        hooks,
        group_policy,
        agent_factory,
        response_sender,
        None,
        "main",
    ));

    if let Some(channel) = dispatcher.get("telegram").await {
        let submit_router = router.clone();
        channel.set_inbox(Arc::new(move |msg| {
            submit_router.submit(msg).map_err(|e| match e {
                gwrouter::SubmitError::RouterStopped => InboxError::Stopped,
                gwrouter::SubmitError::InboxFull => InboxError::Full,
            })
        }));
    }

    let root_ctx = CancellationToken::new();
    router.start(root_ctx.clone()).await;
    info!("gateway started");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping router");

    router.stop(root_ctx).await;
    if let Some(ctx) = telegram_ctx {
        ctx.cancel();
    }

    Ok(())
}

/// Mirrors the admission policy `TelegramPoller::new` derives for its own
/// pre-submit check, so the Pipeline's own `group_policy.should_process`
/// stays a live second gate instead of a permanent no-op.
fn build_group_policy(telegram: Option<&TelegramConfig>) -> GroupPolicy {
    match telegram {
        Some(config) => {
            let mode = if config.require_mention { GroupPolicyMode::RequireMention } else { GroupPolicyMode::AllowAll };
            let allow: HashSet<String> = config.allow_users.iter().cloned().collect();
            GroupPolicy::new(mode, allow, HashSet::new())
        }
        None => GroupPolicy::new(GroupPolicyMode::AllowAll, HashSet::new(), HashSet::new()),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
