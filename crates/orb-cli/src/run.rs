//! Streaming host: JSON stimuli in on stdin, JSON pulses out on stdout, with
//! idle decay on a timer. One lock guards the controller so ticks and decay
//! never interleave.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use orb_core::{NoCache, OrbConfig, OrbController, Stimulus};
use orb_store::{SqliteCache, Store, TraceLog};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

struct HostState {
    controller: OrbController,
    rng: SmallRng,
}

impl HostState {
    /// Tick one input line. `None` when the stimulus was refused.
    fn handle_line(&mut self, line: &str) -> Option<String> {
        let result = Stimulus::from_json(line)
            .and_then(|stimulus| self.controller.tick(&stimulus, &mut self.rng));
        self.drain_events();

        match result {
            Ok(Some(pulse)) => match serde_json::to_string(&pulse) {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode pulse");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "rejected stimulus");
                Some(serde_json::json!({ "error": e.to_string() }).to_string())
            }
        }
    }

    fn drain_events(&mut self) {
        for event in self.controller.take_events() {
            tracing::debug!(?event, "field event");
        }
    }
}

/// Lines from stdin on a plain thread, so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(256);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn decay_loop(state: Arc<Mutex<HostState>>, token: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let mut state = state.lock().await;
                state.controller.decay();
                let phase = state.controller.pulse_phase();
                state.drain_events();
                tracing::trace!(
                    frequency = phase.frequency,
                    density = phase.field_density,
                    purge_active = phase.purge_active,
                    "field pulse"
                );
            }
        }
    }
}

pub async fn run(config: OrbConfig, db: &Path, use_cache: bool) -> Result<()> {
    let store = Store::open(db).with_context(|| format!("failed to open {}", db.display()))?;
    let decay_period = Duration::from_millis(config.decay.interval_ms);

    let controller = OrbController::new(config).context("invalid configuration")?;
    let controller = if use_cache {
        controller.with_cache(SqliteCache::open(db).context("failed to open cache")?)
    } else {
        controller.with_cache(NoCache)
    };
    let mut controller =
        controller.with_trace(TraceLog::open(db).context("failed to open trace log")?);

    if let Some(snapshot) = store.load_snapshot().context("failed to load field snapshot")? {
        match controller.restore(snapshot) {
            Ok(accepted) => tracing::info!(accepted, "resumed field from snapshot"),
            Err(e) => tracing::warn!(error = %e, "ignoring stored snapshot"),
        }
    }

    let state = Arc::new(Mutex::new(HostState {
        controller,
        rng: SmallRng::from_os_rng(),
    }));
    let token = CancellationToken::new();

    let decay = tokio::spawn(decay_loop(state.clone(), token.clone(), decay_period));
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                token.cancel();
            }
        })
    };

    let mut lines = spawn_stdin_reader();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            tracing::info!("stdin closed, shutting down");
            break;
        };
        let line = line.context("failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let output = state.lock().await.handle_line(line);
        if let Some(json) = output {
            stdout.write_all(json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    token.cancel();
    interrupt.abort();
    if let Err(e) = decay.await {
        tracing::warn!(error = %e, "decay task ended abnormally");
    }

    let mut state = state.lock().await;
    state.controller.flush_trace();
    let snapshot = state.controller.snapshot();
    store
        .save_snapshot(&snapshot)
        .context("failed to save field snapshot")?;
    let stats = state.controller.stats();
    tracing::info!(
        ticks = stats.ticks,
        rejected = stats.rejected,
        crystallized = stats.crystallized,
        nodes = snapshot.len(),
        "session complete"
    );
    Ok(())
}
