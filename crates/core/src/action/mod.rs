//! Actions and the dispatcher that runs them.
//!
//! Each action needs a particular execution context. Cell mutation,
//! branching, animation, random assignment and effect requests run in the
//! low-latency context. Logging, data-store mutation and timer registration
//! need the full-capability context. An action may also declare
//! `"context": "fullCapability"` to push itself off the low-latency path.

mod dispatch;
mod template;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Curve, Expr, Interval, Record};

pub use dispatch::{Dispatcher, ExecutionReport, ForwardedAction, Invocation};
pub use template::ItemScope;

/// Scheduling domain an action list runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionContext {
    /// Frame ticks and raw interactions. Never blocks.
    LowLatency,
    /// Taps, wall-clock timers and bridge drains.
    FullCapability,
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowLatency => f.write_str("low-latency"),
            Self::FullCapability => f.write_str("full-capability"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionContext>,
}

impl Action {
    /// Context this action must run in. A kind that needs full capability
    /// cannot be declared down to low latency.
    pub fn required_context(&self) -> ExecutionContext {
        match self.kind.default_context() {
            ExecutionContext::FullCapability => ExecutionContext::FullCapability,
            ExecutionContext::LowLatency => self.context.unwrap_or(ExecutionContext::LowLatency),
        }
    }

    pub fn on(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }
}

impl From<ActionKind> for Action {
    fn from(kind: ActionKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignOp {
    #[default]
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// Interval of a `startTimer` action: milliseconds or an expression
/// evaluating to milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalSpec {
    Millis(f64),
    Expr(Expr),
}

impl IntervalSpec {
    pub fn to_interval(&self) -> Interval {
        match self {
            Self::Millis(ms) => Interval::Fixed(crate::scheduler::millis(*ms)),
            Self::Expr(expr) => Interval::Expr(expr.clone()),
        }
    }
}

fn unit() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ActionKind {
    AssignCell {
        target: String,
        #[serde(default)]
        op: AssignOp,
        value: Expr,
    },
    Log {
        message: String,
        #[serde(default)]
        value: Option<Expr>,
    },
    Branch {
        condition: Expr,
        #[serde(default)]
        then: Vec<Action>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Action>,
    },
    /// Runs `actions` once after `ms`.
    Delay {
        ms: u64,
        #[serde(default)]
        actions: Vec<Action>,
    },
    Animate {
        target: String,
        to: Expr,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        curve: Option<Curve>,
    },
    DataCreate {
        collection: String,
        record: Record,
    },
    DataUpdate {
        collection: String,
        id: String,
        patch: Record,
    },
    DataDelete {
        collection: String,
        id: String,
    },
    PlayEffect {
        name: String,
        #[serde(default = "unit")]
        volume: f64,
        #[serde(default = "unit")]
        pitch: f64,
    },
    StartTimer {
        id: String,
        interval: IntervalSpec,
        #[serde(default)]
        actions: Vec<Action>,
        #[serde(default)]
        low_latency: bool,
    },
    StopTimer {
        id: String,
    },
    /// Assigns a uniform draw from `[min, max)`.
    RandomAssign {
        target: String,
        min: f64,
        max: f64,
    },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssignCell { .. } => "assignCell",
            Self::Log { .. } => "log",
            Self::Branch { .. } => "branch",
            Self::Delay { .. } => "delay",
            Self::Animate { .. } => "animate",
            Self::DataCreate { .. } => "dataCreate",
            Self::DataUpdate { .. } => "dataUpdate",
            Self::DataDelete { .. } => "dataDelete",
            Self::PlayEffect { .. } => "playEffect",
            Self::StartTimer { .. } => "startTimer",
            Self::StopTimer { .. } => "stopTimer",
            Self::RandomAssign { .. } => "randomAssign",
        }
    }

    pub fn default_context(&self) -> ExecutionContext {
        match self {
            Self::AssignCell { .. }
            | Self::Branch { .. }
            | Self::Animate { .. }
            | Self::PlayEffect { .. }
            | Self::RandomAssign { .. } => ExecutionContext::LowLatency,
            Self::Log { .. }
            | Self::Delay { .. }
            | Self::DataCreate { .. }
            | Self::DataUpdate { .. }
            | Self::DataDelete { .. }
            | Self::StartTimer { .. }
            | Self::StopTimer { .. } => ExecutionContext::FullCapability,
        }
    }

    pub fn is_data_mutation(&self) -> bool {
        matches!(
            self,
            Self::DataCreate { .. } | Self::DataUpdate { .. } | Self::DataDelete { .. }
        )
    }
}
