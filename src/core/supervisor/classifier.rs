// ─── Console Line Classifier ───
// Maps a single line of server output to the semantic events the supervisor
// reacts to. Indicator sets are data, so another server family can swap them
// without touching the state machine.

use crate::core::server::SoftwareKind;

/// Token index (space separated) holding the player name in join/leave lines:
/// `[12:00:00] [Server thread/INFO]: Steve[/127.0.0.1] logged in ...`
const PLAYER_NAME_TOKEN: usize = 3;

const READY_INDICATORS: &[&str] = &["INFO]: Done (", "For help, type", "This server is running"];

const CRASH_INDICATORS: &[&str] = &[
    "Exception",
    "Error",
    "FATAL",
    "Crash",
    "OutOfMemoryError",
    "Unsupported Java detected",
];

const JOIN_MARKER: &str = "] logged in with entity id ";
const LEFT_MARKER: &str = " lost connection: Disconnected";

/// Something a console line tells us about the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Ready,
    CrashIndicator,
    PlayerJoined(String),
    PlayerLeft(String),
}

/// Ordered list of substrings; a line matches when it contains any of them.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    patterns: Vec<String>,
    case_insensitive: bool,
}

impl IndicatorSet {
    pub fn exact<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            case_insensitive: false,
        }
    }

    pub fn case_insensitive<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .collect(),
            case_insensitive: true,
        }
    }

    pub fn push(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if self.case_insensitive {
            self.patterns.push(pattern.to_lowercase());
        } else {
            self.patterns.push(pattern);
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matches(&self, line: &str) -> bool {
        if self.case_insensitive {
            let lowered = line.to_lowercase();
            self.patterns.iter().any(|p| lowered.contains(p.as_str()))
        } else {
            self.patterns.iter().any(|p| line.contains(p.as_str()))
        }
    }
}

/// Heuristic classifier for Java edition server consoles.
#[derive(Debug, Clone)]
pub struct LogClassifier {
    ready: IndicatorSet,
    crash: IndicatorSet,
    join_marker: String,
    left_marker: String,
}

impl Default for LogClassifier {
    fn default() -> Self {
        Self {
            ready: IndicatorSet::exact(READY_INDICATORS.iter().copied()),
            crash: IndicatorSet::case_insensitive(CRASH_INDICATORS.iter().copied()),
            join_marker: JOIN_MARKER.to_string(),
            left_marker: LEFT_MARKER.to_string(),
        }
    }
}

impl LogClassifier {
    /// Classifier tuned for a software family. Vanilla and Paper share the
    /// upstream console format.
    pub fn for_software(kind: SoftwareKind) -> Self {
        match kind {
            SoftwareKind::Vanilla | SoftwareKind::Paper => Self::default(),
        }
    }

    pub fn with_ready_indicator(mut self, pattern: impl Into<String>) -> Self {
        self.ready.push(pattern);
        self
    }

    pub fn with_crash_indicator(mut self, pattern: impl Into<String>) -> Self {
        self.crash.push(pattern);
        self
    }

    pub fn with_ready_indicators(mut self, ready: IndicatorSet) -> Self {
        self.ready = ready;
        self
    }

    pub fn is_ready(&self, line: &str) -> bool {
        self.ready.matches(line)
    }

    /// Advisory only: never drives a state transition.
    pub fn is_crash_line(&self, line: &str) -> bool {
        self.crash.matches(line)
    }

    /// Name of a player who just joined, if `line` is a genuine join line.
    ///
    /// A line mentioning any already-online player is treated as chat from
    /// that player and ignored.
    pub fn joined_player(&self, line: &str, online: &[String]) -> Option<String> {
        if !line.contains(self.join_marker.as_str()) {
            return None;
        }

        if online.iter().any(|player| line.contains(player.as_str())) {
            return None;
        }

        let token = line.split(' ').nth(PLAYER_NAME_TOKEN)?;
        let name = token.split('[').next().unwrap_or(token);
        is_valid_player_name(name).then(|| name.to_string())
    }

    /// Name of a player who just left, if `line` is a disconnect line.
    pub fn left_player(&self, line: &str) -> Option<String> {
        if !line.contains(self.left_marker.as_str()) {
            return None;
        }

        let name = line.split(' ').nth(PLAYER_NAME_TOKEN)?;
        is_valid_player_name(name).then(|| name.to_string())
    }

    /// Every event `line` carries, in a fixed order: ready, crash, join, leave.
    pub fn classify(&self, line: &str, online: &[String]) -> Vec<LineEvent> {
        let mut events = Vec::new();
        if self.is_ready(line) {
            events.push(LineEvent::Ready);
        }
        if self.is_crash_line(line) {
            events.push(LineEvent::CrashIndicator);
        }
        if let Some(name) = self.joined_player(line, online) {
            events.push(LineEvent::PlayerJoined(name));
        }
        if let Some(name) = self.left_player(line) {
            events.push(LineEvent::PlayerLeft(name));
        }
        events
    }
}

fn is_valid_player_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic() || c == '_')
}
