use std::fmt;
use std::sync::{Arc, Mutex};
use colored::Colorize;
use serde::{Serialize, Deserialize};

/// Prints the given string with the given color.
///
/// ## Example
/// ```
/// use optima_react::utils::utils_console::{react_print, PrintMode, PrintColor};
/// react_print("test", PrintMode::Print, PrintColor::Blue, false);
/// ```
pub fn react_print(s: &str, mode: PrintMode, color: PrintColor, bolded: bool) {
    let string = react_format(s, color, bolded);
    match mode {
        PrintMode::Println => { println!("{}", string); }
        PrintMode::Print => { print!("{}", string); }
    }
}

fn react_format(s: &str, color: PrintColor, bolded: bool) -> String {
    let mut colored_string = match &color {
        PrintColor::None => { s.normal() }
        _ => {
            let c = color.get_color_triple();
            s.truecolor(c.0, c.1, c.2)
        }
    };
    if bolded { colored_string = colored_string.bold(); }
    return format!("{}", colored_string);
}

/// Enum that is used in react_print function.
/// Println will cause a new line after each line, while Print will not.
#[derive(Clone, Debug)]
pub enum PrintMode {
    Println,
    Print
}

/// Defines color for a react print command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrintColor {
    None,
    Blue,
    Green,
    Red,
    Yellow,
    Cyan,
    Magenta
}
impl PrintColor {
    pub fn get_color_triple(&self) -> (u8, u8, u8) {
        match self {
            PrintColor::None => { (0,0,0) }
            PrintColor::Blue => { return (0, 0, 255) }
            PrintColor::Green => { return (0, 255, 0) }
            PrintColor::Red => { return (255, 0, 0) }
            PrintColor::Yellow => { return (255, 255, 0) }
            PrintColor::Cyan => { return (0, 255, 255) }
            PrintColor::Magenta => { return (255, 0, 255) }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Severity of a `ReactLogEvent`.  Ordered from least to most verbose, so a sink with
/// `min_level = Info` accepts `Error`, `Warn`, and `Info` events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace
}
impl Default for LogLevel {
    fn default() -> Self {
        Self::Warn
    }
}
impl LogLevel {
    fn print_color(&self) -> PrintColor {
        match self {
            LogLevel::Error => { PrintColor::Red }
            LogLevel::Warn => { PrintColor::Yellow }
            LogLevel::Info => { PrintColor::Cyan }
            LogLevel::Debug => { PrintColor::Blue }
            LogLevel::Trace => { PrintColor::None }
        }
    }
    fn tag(&self) -> &'static str {
        match self {
            LogLevel::Error => { "ERROR" }
            LogLevel::Warn => { "WARN" }
            LogLevel::Info => { "INFO" }
            LogLevel::Debug => { "DEBUG" }
            LogLevel::Trace => { "TRACE" }
        }
    }
}

/// Events emitted at the controller's extension points (problem initialization, control point
/// resolution, bound degeneracy, finalize).  Numeric evaluation callbacks never emit events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReactLogEvent {
    NlpInitialized { num_dofs: usize, num_variables: usize, num_constraints: usize, dt: f64, num_control_points: usize, self_avoidance: bool },
    NonPositiveDt { given: f64, substituted: f64 },
    ControlPointsListEmpty,
    ControlPointTypeUnrecognized { tag: String },
    ExtraControlPointsIgnored { supplied: usize, used: usize },
    DegenerateJointRange { joint_idx: usize, min: f64, max: f64 },
    DegenerateBound { joint_idx: usize, lower: f64, upper: f64, resolved: f64 },
    SelfAvoidanceUnavailable { required_dofs: usize, num_dofs: usize },
    ConfigValueClamped { field: String, given: f64, substituted: f64 },
    SolutionFinalized { status: String, objective_value: f64, constraint_violation: f64 },
    Message { level: LogLevel, message: String }
}
impl ReactLogEvent {
    pub fn level(&self) -> LogLevel {
        match self {
            ReactLogEvent::NlpInitialized { .. } => { LogLevel::Info }
            ReactLogEvent::NonPositiveDt { .. } => { LogLevel::Warn }
            ReactLogEvent::ControlPointsListEmpty => { LogLevel::Warn }
            ReactLogEvent::ControlPointTypeUnrecognized { .. } => { LogLevel::Warn }
            ReactLogEvent::ExtraControlPointsIgnored { .. } => { LogLevel::Warn }
            ReactLogEvent::DegenerateJointRange { .. } => { LogLevel::Warn }
            ReactLogEvent::DegenerateBound { .. } => { LogLevel::Debug }
            ReactLogEvent::SelfAvoidanceUnavailable { .. } => { LogLevel::Warn }
            ReactLogEvent::ConfigValueClamped { .. } => { LogLevel::Warn }
            ReactLogEvent::SolutionFinalized { .. } => { LogLevel::Debug }
            ReactLogEvent::Message { level, .. } => { *level }
        }
    }
    pub fn new_message(level: LogLevel, message: &str) -> Self {
        Self::Message { level, message: message.to_string() }
    }
}
impl fmt::Display for ReactLogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactLogEvent::NlpInitialized { num_dofs, num_variables, num_constraints, dt, num_control_points, self_avoidance } => {
                write!(f, "[init] dofs: {} n: {} m: {} dt: {} control points: {} self avoidance: {}", num_dofs, num_variables, num_constraints, dt, num_control_points, self_avoidance)
            }
            ReactLogEvent::NonPositiveDt { given, substituted } => {
                write!(f, "[init] dt must be positive, got {}; using {}", given, substituted)
            }
            ReactLogEvent::ControlPointsListEmpty => {
                write!(f, "[init] additional control points enabled but none were supplied; disabling them")
            }
            ReactLogEvent::ControlPointTypeUnrecognized { tag } => {
                write!(f, "[init] control point type {:?} is not supported; skipping it", tag)
            }
            ReactLogEvent::ExtraControlPointsIgnored { supplied, used } => {
                write!(f, "[init] {} control points supplied, only {} will be used", supplied, used)
            }
            ReactLogEvent::DegenerateJointRange { joint_idx, min, max } => {
                write!(f, "[bounds] joint {} has an empty range [{}, {}]; velocity pinned to zero", joint_idx, min, max)
            }
            ReactLogEvent::DegenerateBound { joint_idx, lower, upper, resolved } => {
                write!(f, "[bounds] joint {} bound crossed (lower {} > upper {}); collapsed to {}", joint_idx, lower, upper, resolved)
            }
            ReactLogEvent::SelfAvoidanceUnavailable { required_dofs, num_dofs } => {
                write!(f, "[init] self avoidance needs at least {} dofs, chain has {}", required_dofs, num_dofs)
            }
            ReactLogEvent::ConfigValueClamped { field, given, substituted } => {
                write!(f, "[config] {} = {} is invalid; using {}", field, given, substituted)
            }
            ReactLogEvent::SolutionFinalized { status, objective_value, constraint_violation } => {
                write!(f, "[finalize] status: {} f(x*): {:e} violation: {:e}", status, objective_value, constraint_violation)
            }
            ReactLogEvent::Message { message, .. } => {
                write!(f, "{}", message)
            }
        }
    }
}

/// The observability collaborator injected into the controller.  Implementors only have to
/// provide `log` and `min_level`; `emit` performs the level filtering.
pub trait ReactLogSink: Send + Sync {
    fn log(&self, level: LogLevel, event: &ReactLogEvent);
    fn min_level(&self) -> LogLevel;
    fn enabled(&self, level: LogLevel) -> bool {
        level <= self.min_level()
    }
    fn emit(&self, event: ReactLogEvent) {
        let level = event.level();
        if self.enabled(level) { self.log(level, &event); }
    }
}

/// Colored console output, prefixed with the name of the emitting component.
#[derive(Clone, Debug)]
pub struct ConsoleLogSink {
    name: String,
    min_level: LogLevel
}
impl ConsoleLogSink {
    pub fn new(name: &str, min_level: LogLevel) -> Self {
        Self { name: name.to_string(), min_level }
    }
}
impl ReactLogSink for ConsoleLogSink {
    fn log(&self, level: LogLevel, event: &ReactLogEvent) {
        react_print(&format!("[{}] {} ", self.name, level.tag()), PrintMode::Print, level.print_color(), true);
        react_print(&format!("{}", event), PrintMode::Println, PrintColor::None, false);
    }
    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

/// Forwards events to `tracing`, so applications that install a subscriber get them as
/// structured records.
#[derive(Clone, Debug)]
pub struct TracingLogSink {
    min_level: LogLevel
}
impl TracingLogSink {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}
impl ReactLogSink for TracingLogSink {
    fn log(&self, level: LogLevel, event: &ReactLogEvent) {
        match level {
            LogLevel::Error => { tracing::error!(event = ?event, "{}", event); }
            LogLevel::Warn => { tracing::warn!(event = ?event, "{}", event); }
            LogLevel::Info => { tracing::info!(event = ?event, "{}", event); }
            LogLevel::Debug => { tracing::debug!(event = ?event, "{}", event); }
            LogLevel::Trace => { tracing::trace!(event = ?event, "{}", event); }
        }
    }
    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

/// Keeps every accepted event in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    min_level: LogLevel,
    events: Mutex<Vec<(LogLevel, ReactLogEvent)>>
}
impl MemoryLogSink {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level, events: Mutex::new(vec![]) }
    }
    pub fn new_arc(min_level: LogLevel) -> Arc<Self> {
        Arc::new(Self::new(min_level))
    }
    pub fn events(&self) -> Vec<(LogLevel, ReactLogEvent)> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.clone()
    }
    pub fn num_events_at_level(&self, level: LogLevel) -> usize {
        self.events().iter().filter(|(l, _)| *l == level).count()
    }
    pub fn contains(&self, predicate: impl Fn(&ReactLogEvent) -> bool) -> bool {
        self.events().iter().any(|(_, e)| predicate(e))
    }
    pub fn clear(&self) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.clear();
    }
}
impl ReactLogSink for MemoryLogSink {
    fn log(&self, level: LogLevel, event: &ReactLogEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push((level, event.clone()));
    }
    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

/// Drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLogSink;
impl ReactLogSink for NullLogSink {
    fn log(&self, _level: LogLevel, _event: &ReactLogEvent) { }
    fn min_level(&self) -> LogLevel {
        LogLevel::Error
    }
    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }
}
