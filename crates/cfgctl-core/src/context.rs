//! Per-invocation state
//!
//! Everything a command line (or a daemon `run` request) can change lives in
//! an [`InvocationContext`] built fresh for that invocation.

use crate::errors::{CtlError, ExError, Result};
use crate::table::TableStyle;
use cfgctl_core_types::RequestContext;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Which downstream counter a successful commit waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitType {
    #[default]
    None,
    /// The distribution tier has copied the change
    Dist,
    /// Every fleet member has applied the change
    Fleet,
}

impl WaitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitType::None => "none",
            WaitType::Dist => "dist",
            WaitType::Fleet => "fleet",
        }
    }
}

impl FromStr for WaitType {
    type Err = ExError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(WaitType::None),
            "dist" => Ok(WaitType::Dist),
            "fleet" => Ok(WaitType::Fleet),
            other => Err(CtlError::InvalidWaitType {
                value: other.to_string(),
            }
            .into()),
        }
    }
}

/// What the engine and waiter need to know about waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    pub kind: WaitType,
    /// Bump the generation counter even when the batch changes nothing
    pub force: bool,
    pub deadline: Option<Instant>,
}

impl WaitSpec {
    pub fn is_waiting(&self) -> bool {
        self.kind != WaitType::None
    }
}

/// Parse a `-t/--timeout` value: a positive number of seconds
///
/// # Errors
///
/// Zero, negative and non-numeric values are rejected.
pub fn parse_timeout(value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(CtlError::InvalidTimeout {
            value: value.to_string(),
        }
        .into()),
    }
}

#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub oneline: bool,
    pub dry_run: bool,
    pub wait: WaitType,
    pub force_wait: bool,
    pub timeout: Option<Duration>,
    pub table_style: TableStyle,
    pub request: RequestContext,
    started: Instant,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self {
            oneline: false,
            dry_run: false,
            wait: WaitType::None,
            force_wait: false,
            timeout: None,
            table_style: TableStyle::default(),
            request: RequestContext::default(),
            started: Instant::now(),
        }
    }
}

impl InvocationContext {
    pub fn new(request: RequestContext) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    pub fn with_wait(mut self, wait: WaitType) -> Self {
        self.wait = wait;
        self
    }

    /// Starts the timeout clock now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self.started = Instant::now();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_oneline(mut self, oneline: bool) -> Self {
        self.oneline = oneline;
        self
    }

    pub fn with_table_style(mut self, table_style: TableStyle) -> Self {
        self.table_style = table_style;
        self
    }

    /// Absolute deadline derived from `timeout`, counted from creation
    pub fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| self.started + t)
    }

    /// Restart the timeout clock
    pub fn restart_clock(&mut self) {
        self.started = Instant::now();
    }

    pub fn wait_spec(&self) -> WaitSpec {
        WaitSpec {
            kind: self.wait,
            force: self.force_wait,
            deadline: self.deadline(),
        }
    }
}
