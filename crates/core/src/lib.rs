//! Core library for the Treeweave runtime.
//!
//! A host streams structural [`Event`]s describing a node tree. The
//! [`Synthesizer`] turns them into a [`NodeGraph`] plus a [`CellStore`] of
//! reactive values, and the [`Dispatcher`] runs the declarative [`Action`]
//! lists attached to nodes. Work is split between a low-latency context
//! (frame ticks, drags) and a full-capability context (data, logging,
//! timers), joined only through the bridges. [`Runtime`] wires all of it
//! together for one namespace.

pub mod action;
pub mod bridge;
pub mod cells;
pub mod config;
pub mod data;
pub mod error;
pub mod expr;
pub mod render;
pub mod runtime;
pub mod scheduler;
pub mod tree;
pub mod value;

pub use action::{
    Action, ActionKind, AssignOp, Dispatcher, ExecutionContext, ExecutionReport, ForwardedAction,
    IntervalSpec, Invocation, ItemScope,
};
pub use bridge::{Bridge, BridgeMessage, EffectBridge, EffectLog, EffectSink, PlayedEffect, Poller};
pub use cells::{CasOutcome, CellStore};
pub use config::{AnimationConfig, BridgeConfig, FrameConfig, RuntimeConfig};
pub use data::{DataStore, MemoryDataStore, Record};
pub use error::{Result, RuntimeError};
pub use expr::{evaluate, evaluate_number, Comparison, EventParams, Expr, Operator, Rgba};
pub use render::{Animator, Curve, NullRenderer, RenderConsumer};
pub use runtime::{Runtime, RuntimeBuilder};
pub use scheduler::{
    FiredTimer, Interval, Scheduler, SchedulerHandle, TimerBody, TimerFamily, TimerKey, TimerSpec,
};
pub use tree::{
    Child, Event, HandlerKind, Handlers, Node, NodeGraph, NodeKind, NodeSpec, Style, Synthesizer,
};
pub use value::{Value, ValueType};
