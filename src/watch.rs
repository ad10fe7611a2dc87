// Watcher - the single timer loop that keeps the engine in sync with the log
//
// One interval drives `Engine::tick`; everything runs on the caller's task,
// so the engine needs no locks. The loop ends on shutdown, when the output
// side asks to stop, or once tailing is disarmed (idle timeout, snapshot
// source, failed tail).

use crate::engine::{Engine, EngineError, Outcome};
use crate::parser::LogRecord;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    Disarmed,
    /// `emit` returned `Break`, e.g. the reader closed the pipe
    OutputClosed,
}

/// Counters gathered while watching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub ticks: u64,
    pub appended: usize,
    pub reloads: usize,
    pub emitted: usize,
}

/// Emit the current view, then follow the log until `shutdown` resolves
///
/// `emit` sees every visible record once, in file order. After a reload the
/// whole view is emitted again. Returning `Break` from `emit` stops the loop.
pub async fn run<F, S>(
    engine: &mut Engine,
    interval: Duration,
    mut emit: F,
    shutdown: S,
) -> Result<(StopReason, WatchSummary), EngineError>
where
    F: FnMut(&LogRecord) -> ControlFlow<()>,
    S: Future<Output = ()>,
{
    let mut summary = WatchSummary::default();
    if emit_all(engine.visible_records(), &mut emit, &mut summary).is_break() {
        return Ok((StopReason::OutputClosed, summary));
    }

    if !engine.auto_reload().is_armed() {
        return Ok((StopReason::Disarmed, summary));
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Watcher received shutdown signal");
                return Ok((StopReason::Shutdown, summary));
            }
            _ = ticker.tick() => {
                summary.ticks += 1;
                match engine.tick(Instant::now())? {
                    Outcome::Tailed { first_seq, appended, .. } => {
                        summary.appended += appended;
                        if emit_all(engine.visible_since(first_seq), &mut emit, &mut summary).is_break() {
                            return Ok((StopReason::OutputClosed, summary));
                        }
                    }
                    Outcome::Loaded(report) => {
                        summary.reloads += 1;
                        if let Some(e) = &report.error {
                            tracing::warn!("Reload failed: {}", e);
                        }
                        if emit_all(engine.visible_records(), &mut emit, &mut summary).is_break() {
                            return Ok((StopReason::OutputClosed, summary));
                        }
                    }
                    Outcome::AutoReload { armed: false } => {
                        return Ok((StopReason::Disarmed, summary));
                    }
                    _ => {}
                }
            }
        }
    }
}

fn emit_all<'a, F>(
    records: impl Iterator<Item = &'a LogRecord>,
    emit: &mut F,
    summary: &mut WatchSummary,
) -> ControlFlow<()>
where
    F: FnMut(&LogRecord) -> ControlFlow<()>,
{
    for record in records {
        emit(record)?;
        summary.emitted += 1;
    }
    ControlFlow::Continue(())
}
