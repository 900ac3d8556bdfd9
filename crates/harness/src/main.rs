//! Loopback match runner.
//!
//! Configured through environment variables (see [`HarnessConfig`]).
//! `RUST_LOG` overrides `LOG_LEVEL`.

use anyhow::{Context, Result};
use asteroid_harness::{HarnessConfig, MatchDriver};
use asteroid_replay::{
    VerifyOptions, acquire_build_fingerprint, read_replay, verify_replay, write_replay,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let config = HarnessConfig::from_env()?;
    init_tracing(&config.log_level);

    info!(
        seed = config.seed,
        max_frames = config.max_frames,
        packet_loss = config.packet_loss,
        "starting loopback match"
    );

    let fingerprint = acquire_build_fingerprint().context("failed to fingerprint build")?;
    let mut driver = MatchDriver::new(&config);
    driver.set_build_fingerprint(fingerprint.clone());
    driver.run()?;
    let outcome = driver.finish();

    info!(
        final_frame = outcome.final_frame,
        physics_states = ?outcome.physics_states,
        winner = outcome.winner,
        end_reason = outcome.end_reason.as_str(),
        client_frames = ?outcome.client_frames,
        sent = outcome.network.sent,
        dropped = outcome.network.dropped,
        "match finished"
    );

    let Some(path) = &config.replay_path else {
        return Ok(());
    };
    let artifact = outcome.replay.context("server recorded no replay")?;
    write_replay(&artifact, path)
        .with_context(|| format!("failed to write replay to {}", path.display()))?;
    info!(path = %path.display(), frames = artifact.final_frame, "replay written");

    if config.verify_replay {
        let artifact = read_replay(path)
            .with_context(|| format!("failed to read replay from {}", path.display()))?;
        let options = VerifyOptions {
            strict_build_check: true,
            current_build: Some(fingerprint),
        };
        verify_replay(&artifact, &options)?;
        info!(checkpoints = artifact.checkpoints.len(), "replay verified");
    }
    Ok(())
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
