//! Runtime wiring for `cpumon`.
//!
//! Owns the Tokio runtime and connects the background tasks:
//! - Monitor task (engine ticks, publishes `MonitorState`)
//! - Config file watcher (live reload on change)
//! - stdin command reader
//! - Ctrl-C handler

pub mod input;

use anyhow::{Context, Result};
use cpumon_config::{ConfigOverrides, ConfigWatcher, MonitorConfig};
use cpumon_core::Message;
use cpumon_renderer::{render_frame, ChartLayout};
use cpumon_system::{detect_source, spawn_monitor, MonitorEngine};
use input::{parse_command, Input, HELP};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How the app was launched, beyond the merged config itself.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Config file to watch for live reloads; `None` disables watching.
    pub watch_path: Option<PathBuf>,
    /// Command-line values re-applied on top of every reload.
    pub overrides:  ConfigOverrides,
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Start monitoring with an already merged config. Returns on quit or Ctrl-C.
pub fn run(config: MonitorConfig, options: RunOptions) -> Result<()> {
    config.validate().context("invalid configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("cannot start Tokio runtime")?;
    let result = runtime.block_on(run_async(config, options));
    // The stdin reader blocks on a thread that can't be cancelled.
    runtime.shutdown_background();
    result
}

async fn run_async(mut config: MonitorConfig, options: RunOptions) -> Result<()> {
    let source = detect_source(config.source).context("no usable CPU counter source")?;
    let mut engine = MonitorEngine::new(source);
    engine.start(&config).context("cannot start monitor")?;

    let mut handle = spawn_monitor(engine);
    let commands = handle.commands.clone();
    let mut view = View::from_config(&config);
    let mut reloads = options.watch_path.as_ref().map(|path| ConfigWatcher::spawn(path).1);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut shutting_down = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("{HELP}");
    view.draw(&handle.state.borrow());

    loop {
        tokio::select! {
            changed = handle.state.changed() => {
                if changed.is_err() {
                    break; // monitor task ended
                }
                view.draw(&handle.state.borrow_and_update());
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(Input::Engine(msg)) => {
                        shutting_down |= msg == Message::Shutdown;
                        send(&commands, msg).await;
                    }
                    Some(Input::ToggleView) => {
                        view.per_core = !view.per_core;
                        view.draw(&handle.state.borrow());
                    }
                    Some(Input::Help) => info!("{HELP}"),
                    None => warn!("unknown command '{}'; {HELP}", line.trim()),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    stdin_open = false;
                }
            },
            Some(()) = next_reload(&mut reloads) => {
                if let Some(path) = &options.watch_path {
                    match reload(path, &options.overrides) {
                        Ok(new) => {
                            for msg in changes(&config, &new) {
                                send(&commands, msg).await;
                            }
                            view = View::from_config(&new);
                            config = new;
                            info!("Config reloaded");
                        }
                        Err(e) => warn!("Config reload failed: {e:#}"),
                    }
                }
            }
            res = &mut ctrl_c, if !shutting_down => {
                if let Err(e) = res {
                    warn!("cannot listen for Ctrl-C: {e}");
                }
                shutting_down = true;
                send(&commands, Message::Shutdown).await;
            }
        }
    }

    drop(commands);
    handle.task.await.context("monitor task panicked")?;
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn send(commands: &mpsc::Sender<Message>, msg: Message) {
    if commands.send(msg).await.is_err() {
        warn!("monitor task is gone");
    }
}

async fn next_reload(reloads: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match reloads {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn reload(path: &Path, overrides: &ConfigOverrides) -> Result<MonitorConfig> {
    let mut config = cpumon_config::load(path)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Engine commands needed to move a running monitor from `old` to `new`.
fn changes(old: &MonitorConfig, new: &MonitorConfig) -> Vec<Message> {
    let mut msgs = Vec::new();
    if new.interval_ms != old.interval_ms {
        msgs.push(Message::SetInterval(new.interval_ms));
    }
    if new.window_s != old.window_s {
        msgs.push(Message::Resize(new.window_s));
    }
    if new.max_cores != old.max_cores {
        msgs.push(Message::SetMaxCores(new.max_cores));
    }
    if new.source != old.source {
        warn!(
            "counter source change ({} -> {}) takes effect on restart",
            old.source, new.source
        );
    }
    msgs
}

/// Terminal output settings.
#[derive(Debug, Clone, Copy)]
struct View {
    per_core: bool,
    layout:   ChartLayout,
    clear:    bool,
}

impl View {
    fn from_config(config: &MonitorConfig) -> Self {
        Self {
            per_core: config.per_core,
            layout:   ChartLayout::from_config(config),
            clear:    std::io::stdout().is_terminal(),
        }
    }

    fn draw(&self, state: &cpumon_core::MonitorState) {
        let frame = render_frame(state, self.per_core, &self.layout);
        let mut out = std::io::stdout().lock();
        let result = if self.clear {
            write!(out, "\x1b[2J\x1b[H{frame}\n")
        } else {
            writeln!(out, "{frame}\n")
        };
        if let Err(e) = result.and_then(|()| out.flush()) {
            warn!("cannot write frame: {e}");
        }
    }
}
