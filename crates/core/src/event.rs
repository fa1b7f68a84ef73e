/// Commands that flow from the user-facing side into the monitor task.
///
/// Sources:
/// - stdin command reader  → `Pause`, `Resume`, `TogglePause`, `Clear`, `SetMaxCores`
/// - Config watcher task   → `SetInterval`, `Resize`, `SetMaxCores`
/// - Ctrl-C / `q`          → `Shutdown`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Pause,
    Resume,
    TogglePause,
    /// Drop all history but keep sampling.
    Clear,
    /// Limit the cores exposed to the renderer (0 = all).
    SetMaxCores(usize),
    /// New sampling cadence in milliseconds.
    SetInterval(u64),
    /// New history window in seconds.
    Resize(u64),
    /// Stop the engine and end the monitor task.
    Shutdown,
}
