//! Event logging for the optimization pipeline.
//!
//! Every transformation and every notable decision a pass makes is recorded
//! as an [`Event`]. The log is append-only and lock-free, so workers running
//! passes on different methods in parallel share one [`EventLog`] through a
//! plain `&` reference. Counts and statistics are derived from the events
//! instead of being tracked alongside them.
//!
//! # Example
//!
//! ```rust
//! use dotinline::compiler::{EventKind, EventLog};
//! use dotinline::metadata::token::Token;
//!
//! let log = EventLog::new();
//! log.record(EventKind::ClassInlined)
//!     .at(Token::method(2), 0)
//!     .message("scalarized new Point");
//! log.info("class inlining finished");
//!
//! assert_eq!(log.count_kind(EventKind::ClassInlined), 1);
//! assert_eq!(log.summary(), "1 class inlined");
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use crate::metadata::token::Token;

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum EventKind {
    /// A call site was replaced by the callee's body.
    MethodInlined,
    /// An allocation or singleton read was scalarized away.
    ClassInlined,
    /// A field read of a scalarized object was replaced by its value.
    FieldReadReplaced,
    /// A phi was synthesized to merge field values.
    PhiInserted,
    /// A phi was simplified or removed.
    PhiSimplified,
    /// A conditional branch was folded to a jump.
    BranchFolded,
    /// A monitor operation on a local object was removed.
    MonitorRemoved,
    /// An instruction was removed.
    InstructionRemoved,
    /// A basic block became unreachable and was cleared.
    BlockRemoved,
    /// An argument the callee never reads was replaced by `null`.
    ArgumentNulled,
    /// A cast that cannot fail was removed.
    CastRemoved,

    /// A class-inlining candidate was rejected before any mutation.
    ClassInlineRejected,
    /// A class-inlining commit was abandoned part-way.
    ClassInlineAborted,

    /// Informational message.
    Info,
    /// Something unexpected but recoverable happened.
    Warning,
    /// Something failed.
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::MethodInlined => "method inlined",
            Self::ClassInlined => "class inlined",
            Self::FieldReadReplaced => "field read replaced",
            Self::PhiInserted => "phi inserted",
            Self::PhiSimplified => "phi simplified",
            Self::BranchFolded => "branch folded",
            Self::MonitorRemoved => "monitor removed",
            Self::InstructionRemoved => "instruction removed",
            Self::BlockRemoved => "block removed",
            Self::ArgumentNulled => "argument nulled",
            Self::CastRemoved => "cast removed",
            Self::ClassInlineRejected => "class inline rejected",
            Self::ClassInlineAborted => "class inline aborted",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns `true` if this event represents a change to the IR.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        !self.is_diagnostic() && !self.is_decision()
    }

    /// Returns `true` for candidate decisions that left the IR untouched
    /// or partially touched.
    #[must_use]
    pub fn is_decision(&self) -> bool {
        matches!(self, Self::ClassInlineRejected | Self::ClassInlineAborted)
    }

    /// Returns `true` for info, warning and error messages.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The method being compiled, if known.
    pub method: Option<Token>,
    /// Block index within the method.
    pub location: Option<usize>,
    /// Human-readable detail.
    pub message: String,
    /// Name of the pass that recorded the event.
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method {
            Some(method) => write!(f, "[{}] {}: {}", self.kind, method, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Fluent builder returned by [`EventLog::record`].
///
/// The event is appended when the builder is dropped, so a bare
/// `log.record(kind);` statement records an event with the default message.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<Token>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the method and block the event refers to.
    pub fn at(mut self, method: Token, location: usize) -> Self {
        self.method = Some(method);
        self.location = Some(location);
        self
    }

    /// Sets only the method.
    pub fn method(mut self, method: Token) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the message.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates the event with a pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            method: self.method.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Thread-safe, append-only collection of events.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let copy = Self::new();
        copy.merge(self);
        copy
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns `true` if nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of all events in `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns `true` if any event of `kind` exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Iterates over all events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Iterates over events of `kind`.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Iterates over events recorded for `method`.
    pub fn filter_method(&self, method: Token) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.method == Some(method))
    }

    /// Iterates over transformation events.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Iterates over warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of distinct methods with events.
    #[must_use]
    pub fn methods_affected(&self) -> usize {
        self.iter()
            .filter_map(|e| e.method)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Renders transformation counts, e.g. `"2 class inlined, 3 field read replaced"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(kind, _)| kind.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }

    /// Derives aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        DerivedStats::from_log(self)
    }
}

/// Aggregate statistics computed from an [`EventLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Objects scalarized away.
    pub classes_inlined: usize,
    /// Candidates rejected before mutation.
    pub candidates_rejected: usize,
    /// Commits abandoned part-way.
    pub commits_aborted: usize,
    /// Call sites inlined.
    pub methods_inlined: usize,
    /// Field reads replaced by values.
    pub field_reads_replaced: usize,
    /// Phis synthesized.
    pub phis_inserted: usize,
    /// Instructions removed.
    pub instructions_removed: usize,
    /// Blocks cleared.
    pub blocks_removed: usize,
    /// Methods with at least one transformation.
    pub methods_transformed: usize,
}

impl DerivedStats {
    /// Computes the statistics of `log`.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let count = |kind| counts.get(&kind).copied().unwrap_or(0);
        Self {
            classes_inlined: count(EventKind::ClassInlined),
            candidates_rejected: count(EventKind::ClassInlineRejected),
            commits_aborted: count(EventKind::ClassInlineAborted),
            methods_inlined: count(EventKind::MethodInlined),
            field_reads_replaced: count(EventKind::FieldReadReplaced),
            phis_inserted: count(EventKind::PhiInserted),
            instructions_removed: count(EventKind::InstructionRemoved),
            blocks_removed: count(EventKind::BlockRemoved),
            methods_transformed: log
                .transformations()
                .filter_map(|e| e.method)
                .collect::<HashSet<_>>()
                .len(),
        }
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} classes inlined ({} rejected, {} aborted), {} methods inlined, {} field reads replaced",
            self.classes_inlined,
            self.candidates_rejected,
            self.commits_aborted,
            self.methods_inlined,
            self.field_reads_replaced
        )
    }
}
