use crate::auth::AuthConfig;
use crate::cli::actions::{server, Action};
use anyhow::{anyhow, Result};
use secrecy::SecretString;

fn seconds(matches: &clap::ArgMatches, name: &str) -> Result<u64> {
    matches
        .get_one::<u64>(name)
        .copied()
        .ok_or_else(|| anyhow!("missing required argument: --{name}"))
}

/// Turn parsed arguments into an [`Action`].
/// # Errors
/// Returns an error if a required argument is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let config = AuthConfig::new()
        .with_access_ttl_seconds(seconds(matches, "access-ttl")?)
        .with_refresh_ttl_seconds(seconds(matches, "refresh-ttl")?)
        .with_session_idle_timeout_seconds(seconds(matches, "session-idle-timeout")?)
        .with_max_failed_attempts(
            matches
                .get_one::<u32>("max-failed-attempts")
                .copied()
                .ok_or_else(|| anyhow!("missing required argument: --max-failed-attempts"))?,
        )
        .with_lockout_duration_seconds(seconds(matches, "lockout-duration")?)
        .with_session_sweep_interval_seconds(seconds(matches, "session-sweep-interval")?)
        .with_lock_sweep_interval_seconds(seconds(matches, "lock-sweep-interval")?);

    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one::<String>("dsn")
            .cloned()
            .ok_or_else(|| anyhow!("missing required argument: --dsn"))?,
        token_secret: matches
            .get_one::<String>("token-secret")
            .cloned()
            .map(SecretString::from)
            .ok_or_else(|| anyhow!("missing required argument: --token-secret"))?,
        config,
    }))
}
