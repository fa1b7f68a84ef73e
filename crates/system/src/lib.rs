//! CPU sampling core: counter sources, utilization math, rolling history and
//! the engine that ties them to a timer.

pub mod engine;
pub mod history;
pub mod sampler;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{MonitorEngine, TickOutcome};
pub use history::HistoryBuffer;
pub use source::{detect_source, CounterSource, ProcStatSource, SysinfoSource};

use cpumon_core::{Message, MonitorState};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

/// Channels for talking to a running monitor task.
#[derive(Debug)]
pub struct MonitorHandle {
    /// Commands into the task.
    pub commands: mpsc::Sender<Message>,
    /// Latest whole [`MonitorState`], replaced after every change.
    pub state:    watch::Receiver<MonitorState>,
    pub task:     JoinHandle<()>,
}

/// Spawn a background Tokio task that owns `engine`, ticks it at the
/// engine's interval and publishes a fresh [`MonitorState`] after each change.
///
/// `engine` should already be started. A tick that comes due while the
/// previous one is still running is skipped, never queued. The task ends on
/// [`Message::Shutdown`] or when every command sender is dropped, stopping the
/// engine on the way out.
pub fn spawn_monitor(mut engine: MonitorEngine) -> MonitorHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
    let (state_tx, state_rx) = watch::channel(engine.snapshot_state());

    let task = tokio::spawn(async move {
        let mut ticker = ticker(engine.interval());

        loop {
            let changed = tokio::select! {
                _ = ticker.tick() => !matches!(
                    engine.tick(),
                    TickOutcome::Paused | TickOutcome::Stopped | TickOutcome::Deferred
                ),
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Message::Shutdown) => break,
                    Some(Message::SetInterval(ms)) => match engine.set_interval(ms) {
                        Ok(()) => {
                            ticker = self::ticker(engine.interval());
                            false
                        }
                        Err(e) => {
                            warn!("ignoring interval change: {e}");
                            false
                        }
                    },
                    Some(msg) => apply(&mut engine, msg),
                },
            };

            if changed {
                state_tx.send_replace(engine.snapshot_state());
            }
        }

        engine.stop();
        state_tx.send_replace(engine.snapshot_state());
        info!("monitor task finished");
    });

    MonitorHandle {
        commands: cmd_tx,
        state:    state_rx,
        task,
    }
}

/// Apply a command that doesn't touch the ticker. Returns whether the
/// published state needs refreshing.
fn apply(engine: &mut MonitorEngine, msg: Message) -> bool {
    match msg {
        Message::Pause => engine.pause(),
        Message::Resume => engine.resume(),
        Message::TogglePause => engine.pause() || engine.resume(),
        Message::Clear => {
            engine.clear();
            true
        }
        Message::SetMaxCores(n) => {
            engine.set_max_cores(n);
            true
        }
        Message::Resize(window_s) => match engine.resize(window_s) {
            Ok(()) => true,
            Err(e) => {
                warn!("ignoring window change: {e}");
                false
            }
        },
        Message::SetInterval(_) | Message::Shutdown => false,
    }
}

/// First tick one period from now: the baseline was just read by `start`.
fn ticker(period: Duration) -> Interval {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{snap, ScriptedSource, SlowSource};
    use cpumon_config::MonitorConfig;
    use cpumon_core::{RunState, Series};

    fn started_engine(reads: usize) -> MonitorEngine {
        let script = (0..reads).map(|i| {
            let n = i as u64;
            Ok(snap(i as i64 * 500, (n * 25, n * 100), &[Some((n * 50, n * 100))]))
        });
        let mut engine = MonitorEngine::new(Box::new(ScriptedSource::new(script)));
        engine.start(&MonitorConfig::default()).unwrap();
        engine
    }

    fn aggregate_len(state: &MonitorState) -> usize {
        state.get(Series::Aggregate).map_or(0, |h| h.samples.len())
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_samples_each_tick() {
        let handle = spawn_monitor(started_engine(10));

        time::sleep(Duration::from_millis(1_600)).await;
        let state = handle.state.borrow().clone();
        assert_eq!(state.run_state, RunState::Running);
        assert_eq!(aggregate_len(&state), 3);
        assert_eq!(state.get(Series::Core(0)).unwrap().latest().unwrap().percentage, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_history_until_resume() {
        let handle = spawn_monitor(started_engine(10));
        time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(aggregate_len(&handle.state.borrow()), 2);

        handle.commands.send(Message::TogglePause).await.unwrap();
        time::sleep(Duration::from_millis(2_000)).await;
        let paused = handle.state.borrow().clone();
        assert_eq!(paused.run_state, RunState::Paused);
        assert_eq!(aggregate_len(&paused), 2);

        handle.commands.send(Message::TogglePause).await.unwrap();
        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(aggregate_len(&handle.state.borrow()), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_and_max_cores_are_applied() {
        let handle = spawn_monitor(started_engine(10));
        time::sleep(Duration::from_millis(1_100)).await;

        handle.commands.send(Message::SetMaxCores(0)).await.unwrap();
        handle.commands.send(Message::Clear).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(aggregate_len(&handle.state.borrow()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_engine_and_task() {
        let handle = spawn_monitor(started_engine(10));
        time::sleep(Duration::from_millis(600)).await;

        handle.commands.send(Message::Shutdown).await.unwrap();
        handle.task.await.unwrap();
        let state = handle.state.borrow().clone();
        assert_eq!(state.run_state, RunState::Stopped);
        assert!(state.series.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_interval_is_ignored() {
        let handle = spawn_monitor(started_engine(10));
        handle.commands.send(Message::SetInterval(5)).await.unwrap();
        time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(aggregate_len(&handle.state.borrow()), 2);
    }

    #[tokio::test]
    async fn late_ticks_are_skipped_not_queued() {
        // First tick blocks for three and a half intervals.
        let (source, started) = SlowSource::new([Duration::ZERO, Duration::from_millis(350)]);
        let mut engine = MonitorEngine::new(Box::new(source));
        engine
            .start(&MonitorConfig { interval_ms: 100, ..Default::default() })
            .unwrap();

        let handle = spawn_monitor(engine);
        time::sleep(Duration::from_millis(900)).await;
        handle.commands.send(Message::Shutdown).await.unwrap();
        handle.task.await.unwrap();

        let started = started.lock().unwrap();
        // [0] is the baseline read taken by `start`.
        let gaps: Vec<Duration> = started[1..].windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.len() >= 2, "{gaps:?}");
        assert!(gaps[0] >= Duration::from_millis(350), "{gaps:?}");
        // Missed ticks would otherwise fire back to back once the slow read returns.
        assert!(gaps.iter().all(|g| *g >= Duration::from_millis(50)), "{gaps:?}");
    }
}
