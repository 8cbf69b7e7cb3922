use crate::{
    auth::{Argon2Verifier, AuthConfig, AuthService, MaintenanceScheduler, TokenCodec},
    cli::telemetry,
    staffgate,
    storage::{PgAuditSink, PgCredentialStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: SecretString,
    pub config: AuthConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the token secret is too
/// short, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let Args {
        port,
        dsn,
        token_secret,
        config,
    } = args;

    let codec = TokenCodec::new(token_secret.expose_secret().as_bytes().to_vec())
        .context("Invalid token secret")?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(10)
        .max_lifetime(Duration::from_secs(60 * 30))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let (audit, audit_writer) = PgAuditSink::spawn(pool.clone());

    let service = Arc::new(
        AuthService::new(
            config,
            codec,
            Arc::new(PgCredentialStore::new(pool)),
            Arc::new(Argon2Verifier),
        )
        .with_audit_sink(Arc::new(audit)),
    );

    let maintenance = MaintenanceScheduler::new(Arc::clone(&service), &config).spawn();

    let result = staffgate::serve(port, service, shutdown_signal()).await;

    maintenance.shutdown();

    // The writer exits once every sink handle is dropped and the queue drained.
    if tokio::time::timeout(Duration::from_secs(5), audit_writer)
        .await
        .is_err()
    {
        debug!("audit writer did not drain before shutdown");
    }

    telemetry::shutdown_tracer();

    result
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
    }
    info!("Gracefully shutdown");
}

fn log_startup_args(args: &Args) {
    let config = &args.config;
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("access_ttl", format!("{}s", config.access_ttl().as_secs())),
        ("refresh_ttl", format!("{}s", config.refresh_ttl().as_secs())),
        (
            "session_idle_timeout",
            format!("{}s", config.session_idle_timeout().as_secs()),
        ),
        (
            "max_failed_attempts",
            config.max_failed_attempts().to_string(),
        ),
        (
            "lockout_duration",
            format!("{}s", config.lockout_duration().as_secs()),
        ),
        (
            "session_sweep_interval",
            format!("{}s", config.session_sweep_interval().as_secs()),
        ),
        (
            "lock_sweep_interval",
            format!("{}s", config.lock_sweep_interval().as_secs()),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} ({})\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH.get(0..7).unwrap_or(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
