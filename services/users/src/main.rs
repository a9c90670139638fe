use anyhow::Context;
use sea_orm::Database;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tradedesk_core::config::Config;
use tradedesk_core::tracing::init_tracing;
use tradedesk_users::config::{EmailProvider, UsersConfig};
use tradedesk_users::infra::broker::JetStreamSource;
use tradedesk_users::infra::jwt::JwtTokenIssuer;
use tradedesk_users::infra::mail::{Mailer, NoopMailer, SmtpMailer};
use tradedesk_users::infra::store::Store;
use tradedesk_users::relay::{OutboxRelay, RelayError};
use tradedesk_users::router::build_router;
use tradedesk_users::state::AppState;
use tradedesk_users_migration::{Migrator, MigratorTrait};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = UsersConfig::try_from_env().context("load users config")?;

    let store = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("connect to database")?;
            Migrator::up(&db, None).await.context("run migrations")?;
            Store::postgres(db)
        }
        None => Store::memory(),
    };
    info!(backend = store.backend(), "user store ready");

    let mailer = match config.email_provider {
        EmailProvider::Smtp => Mailer::Smtp(SmtpMailer::new(config.smtp())?),
        EmailProvider::Noop => Mailer::Noop(NoopMailer),
    };
    info!(provider = mailer.provider(), "verification mailer ready");

    let tokens = JwtTokenIssuer::new(config.jwt()?)?;

    // Relay shares the process; a fatal relay error stops the HTTP server too.
    let cancel = CancellationToken::new();
    let (relay_errors, mut relay_failed) = mpsc::channel::<RelayError>(1);
    match config.jetstream() {
        Some(settings) => {
            let source = JetStreamSource::connect(&settings).await?;
            let relay = OutboxRelay {
                source,
                outbox: store.clone(),
                mailer,
            };
            let relay_cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = relay.run(relay_cancel).await {
                    let _ = relay_errors.send(e).await;
                }
            });
        }
        None => {
            drop(relay_errors);
            info!("NATS_URL not set, outbox relay disabled");
        }
    }

    let state = AppState {
        store,
        tokens,
        token_ttl: config.token_ttl()?,
        resend_cooldown: config.resend_cooldown()?,
    };
    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.users_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!("users service listening on {addr}");
    let shutdown = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
                Some(e) = relay_failed.recv() => {
                    tracing::error!(error = %e, "outbox relay failed, shutting down");
                }
            }
            shutdown.cancel();
        })
        .await
        .context("http server")?;

    cancel.cancel();
    Ok(())
}
