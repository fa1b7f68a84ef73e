//! Keyboard commands read line-by-line from stdin.

use cpumon_core::Message;

/// What a line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Forward to the monitor task.
    Engine(Message),
    /// Switch between aggregate-only and per-core frames (display only).
    ToggleView,
    Help,
}

pub const HELP: &str = "commands: p = pause/resume, c = clear, v = toggle per-core view, \
                        m <n> = show first n cores (0 = all), q = quit";

/// Parse one input line. Unknown input yields `None`.
pub fn parse_command(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let cmd = words.next()?.to_ascii_lowercase();

    let input = match cmd.as_str() {
        "p" | "pause" => Input::Engine(Message::TogglePause),
        "c" | "clear" => Input::Engine(Message::Clear),
        "v" | "view" => Input::ToggleView,
        "m" | "max" => Input::Engine(Message::SetMaxCores(words.next()?.parse().ok()?)),
        "q" | "quit" => Input::Engine(Message::Shutdown),
        "h" | "help" | "?" => Input::Help,
        _ => return None,
    };
    Some(input)
}
