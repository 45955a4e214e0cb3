use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use rand::{
    distr::{Distribution, Uniform},
    Rng,
};

use super::{Action, ActionKind, AssignOp, ExecutionContext, ItemScope};
use crate::{
    evaluate, evaluate_number, AnimationConfig, Bridge, CellStore, DataStore, EffectBridge,
    EventParams, RenderConsumer, RuntimeError, SchedulerHandle, TimerBody, TimerFamily, TimerKey,
    TimerSpec, Value,
};

/// Per-call inputs to [`Dispatcher::execute`].
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub context: ExecutionContext,
    pub params: &'a EventParams,
    pub scope: Option<&'a ItemScope>,
    /// Runtime clock, used when registering timers.
    pub now: Duration,
}

impl<'a> Invocation<'a> {
    pub fn new(context: ExecutionContext, params: &'a EventParams, now: Duration) -> Self {
        Self {
            context,
            params,
            scope: None,
            now,
        }
    }

    pub fn with_scope(mut self, scope: Option<&'a ItemScope>) -> Self {
        self.scope = scope;
        self
    }
}

/// An action the low-latency context handed over for full-capability
/// execution, together with the inputs it was invoked with.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedAction {
    pub action: Action,
    pub params: EventParams,
    pub scope: Option<ItemScope>,
}

/// What happened during one [`Dispatcher::execute`] call.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub executed: usize,
    pub forwarded: usize,
    pub errors: Vec<RuntimeError>,
}

impl ExecutionReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ExecutionReport) {
        self.executed += other.executed;
        self.forwarded += other.forwarded;
        self.errors.extend(other.errors);
    }
}

/// Interprets action lists for one namespace.
#[derive(Clone)]
pub struct Dispatcher {
    namespace: String,
    cells: Arc<CellStore>,
    scheduler: SchedulerHandle,
    effects: Arc<EffectBridge>,
    forwarded: Arc<Bridge<ForwardedAction>>,
    data: Arc<dyn DataStore>,
    renderer: Arc<dyn RenderConsumer>,
    animation: AnimationConfig,
    delay_ids: Arc<AtomicU64>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("namespace", &self.namespace)
            .field("cells", &self.cells.len())
            .field("pending_effects", &self.effects.pending())
            .field("pending_forwards", &self.forwarded.len())
            .finish()
    }
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        namespace: impl Into<String>,
        cells: Arc<CellStore>,
        scheduler: SchedulerHandle,
        effects: Arc<EffectBridge>,
        forwarded: Arc<Bridge<ForwardedAction>>,
        data: Arc<dyn DataStore>,
        renderer: Arc<dyn RenderConsumer>,
        animation: AnimationConfig,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            cells,
            scheduler,
            effects,
            forwarded,
            data,
            renderer,
            animation,
            delay_ids: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Runs `actions` in order.
    ///
    /// From the low-latency context, data mutations are refused and reported;
    /// other full-capability actions are forwarded to the full-capability
    /// side and counted in [`ExecutionReport::forwarded`].
    pub fn execute(&self, actions: &[Action], invocation: &Invocation<'_>) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for action in actions {
            report.merge(self.execute_one(action, invocation));
        }
        report
    }

    /// Runs everything the low-latency side forwarded so far. Full-capability
    /// context only.
    pub fn run_forwarded(&self, now: Duration) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for forwarded in self.forwarded.drain() {
            let invocation = Invocation::new(ExecutionContext::FullCapability, &forwarded.params, now)
                .with_scope(forwarded.scope.as_ref());
            report.merge(self.execute_one(&forwarded.action, &invocation));
        }
        report
    }

    fn execute_one(&self, action: &Action, invocation: &Invocation<'_>) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let required = action.required_context();

        if required == ExecutionContext::FullCapability
            && invocation.context == ExecutionContext::LowLatency
        {
            if action.kind.is_data_mutation() {
                tracing::error!(
                    namespace = %self.namespace,
                    action = action.kind.name(),
                    "data mutation reached from the low-latency context; skipped"
                );
                report.errors.push(RuntimeError::ContextViolation {
                    action: action.kind.name(),
                    context: invocation.context,
                });
            } else {
                tracing::debug!(namespace = %self.namespace, action = action.kind.name(), "forwarded to full-capability context");
                self.forwarded.enqueue(ForwardedAction {
                    action: action.clone(),
                    params: invocation.params.clone(),
                    scope: invocation.scope.cloned(),
                });
                report.forwarded += 1;
            }
            return report;
        }

        match &action.kind {
            ActionKind::AssignCell { target, op, value } => {
                let value = evaluate(value, &self.cells, invocation.params);
                self.assign(target, *op, value);
            }
            ActionKind::Branch {
                condition,
                then,
                otherwise,
            } => {
                let taken = if evaluate(condition, &self.cells, invocation.params).is_truthy() {
                    then
                } else {
                    otherwise
                };
                report.merge(self.execute(taken, invocation));
            }
            ActionKind::Animate {
                target,
                to,
                duration_ms,
                curve,
            } => {
                let to = evaluate_number(to, &self.cells, invocation.params);
                let duration =
                    Duration::from_millis(duration_ms.unwrap_or(self.animation.default_duration_ms));
                let curve = curve.unwrap_or(self.animation.default_curve);
                self.renderer.animate_to(target, to, duration, curve);
            }
            ActionKind::PlayEffect {
                name,
                volume,
                pitch,
            } => {
                self.effects.request(&self.namespace, name, *volume, *pitch);
            }
            ActionKind::RandomAssign { target, min, max } => match draw(*min, *max) {
                Some(value) => self.assign(target, AssignOp::Set, Value::Number(value)),
                None => {
                    tracing::debug!(namespace = %self.namespace, cell = %target, min, max, "randomAssign with non-finite bounds ignored");
                }
            },
            kind => self.execute_full_capability(kind, invocation),
        }

        report.executed += 1;
        report
    }

    fn execute_full_capability(&self, kind: &ActionKind, invocation: &Invocation<'_>) {
        debug_assert_eq!(invocation.context, ExecutionContext::FullCapability);

        let scoped = |text: &str| match invocation.scope {
            Some(scope) => scope.resolve_str(text),
            None => text.to_string(),
        };

        match kind {
            ActionKind::Log { message, value } => match value {
                Some(expr) => {
                    let value = evaluate(expr, &self.cells, invocation.params);
                    tracing::info!(namespace = %self.namespace, %value, "{message}");
                }
                None => tracing::info!(namespace = %self.namespace, "{message}"),
            },
            ActionKind::Delay { ms, actions } => {
                let id = format!("delay#{}", self.delay_ids.fetch_add(1, Ordering::Relaxed));
                let mut spec = TimerSpec::once(
                    Duration::from_millis(*ms),
                    TimerBody::actions(actions.clone()),
                );
                spec.params = invocation.params.clone();
                self.scheduler.lock().start(
                    TimerKey::new(&self.namespace, id),
                    spec,
                    invocation.now,
                    &self.cells,
                );
            }
            ActionKind::DataCreate { collection, record } => {
                let record = match invocation.scope {
                    Some(scope) => scope.resolve_record(record),
                    None => record.clone(),
                };
                let id = self.data.create_record(collection, record);
                tracing::debug!(namespace = %self.namespace, %collection, %id, "record created");
            }
            ActionKind::DataUpdate {
                collection,
                id,
                patch,
            } => {
                let patch = match invocation.scope {
                    Some(scope) => scope.resolve_record(patch),
                    None => patch.clone(),
                };
                self.data.update_record(collection, &scoped(id), patch);
            }
            ActionKind::DataDelete { collection, id } => {
                self.data.delete_record(collection, &scoped(id));
            }
            ActionKind::StartTimer {
                id,
                interval,
                actions,
                low_latency,
            } => {
                let family = if *low_latency {
                    TimerFamily::Frame
                } else {
                    TimerFamily::WallClock
                };
                let mut spec = TimerSpec::repeating(
                    interval.to_interval(),
                    TimerBody::actions(actions.clone()),
                    family,
                );
                spec.params = invocation.params.clone();
                self.scheduler.lock().start(
                    TimerKey::new(&self.namespace, id),
                    spec,
                    invocation.now,
                    &self.cells,
                );
            }
            ActionKind::StopTimer { id } => {
                self.scheduler.lock().stop(&self.namespace, id);
            }
            ActionKind::AssignCell { .. }
            | ActionKind::Branch { .. }
            | ActionKind::Animate { .. }
            | ActionKind::PlayEffect { .. }
            | ActionKind::RandomAssign { .. } => {
                unreachable!("low-latency actions are handled by execute_one")
            }
        }
    }

    fn assign(&self, target: &str, op: AssignOp, value: Value) {
        let written = match op {
            AssignOp::Set => self
                .cells
                .update(target, |current| value.clone().coerce(current.value_type())),
            AssignOp::Div if value.as_number() == 0.0 => return,
            op => {
                let operand = value.as_number();
                self.cells.update(target, |current| {
                    let ty = current.value_type();
                    let current = current.as_number();
                    Value::Number(match op {
                        AssignOp::Add => current + operand,
                        AssignOp::Sub => current - operand,
                        AssignOp::Mul => current * operand,
                        _ => current / operand,
                    })
                    .coerce(ty)
                })
            }
        };
        if written.is_none() {
            tracing::debug!(namespace = %self.namespace, cell = target, "assignment to unknown cell ignored");
        }
    }
}

/// Uniform draw from `[min, max)`. Bounds whose span overflows fall back to
/// a blend of the endpoints; non-finite bounds yield nothing.
fn draw(min: f64, max: f64) -> Option<f64> {
    if !min.is_finite() || !max.is_finite() {
        return None;
    }
    if max <= min {
        return Some(min);
    }
    let mut rng = rand::rng();
    match Uniform::new(min, max) {
        Ok(uniform) => Some(uniform.sample(&mut rng)),
        Err(_) => {
            let t: f64 = rng.random();
            Some((min * (1.0 - t) + max * t).clamp(min, max))
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{Curve, Expr, MemoryDataStore, Scheduler};

    #[derive(Debug, Default)]
    struct RecordingRenderer {
        requests: Mutex<Vec<(String, f64, Duration, Curve)>>,
    }

    impl RenderConsumer for RecordingRenderer {
        fn animate_to(&self, cell_id: &str, target: f64, duration: Duration, curve: Curve) {
            self.requests
                .lock()
                .push((cell_id.to_string(), target, duration, curve));
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        cells: Arc<CellStore>,
        scheduler: SchedulerHandle,
        effects: Arc<EffectBridge>,
        data: Arc<MemoryDataStore>,
        renderer: Arc<RecordingRenderer>,
    }

    fn fixture() -> Fixture {
        let cells = Arc::new(CellStore::new("ns"));
        let scheduler = Scheduler::shared(Duration::from_millis(16));
        let effects = Arc::new(EffectBridge::new());
        let data = Arc::new(MemoryDataStore::new());
        let renderer = Arc::new(RecordingRenderer::default());
        let dispatcher = Dispatcher::new(
            "ns",
            cells.clone(),
            scheduler.clone(),
            effects.clone(),
            Arc::new(Bridge::new()),
            data.clone(),
            renderer.clone(),
            AnimationConfig::default(),
        );
        Fixture {
            dispatcher,
            cells,
            scheduler,
            effects,
            data,
            renderer,
        }
    }

    fn actions(json: serde_json::Value) -> Vec<Action> {
        serde_json::from_value(json).unwrap()
    }

    fn run(fixture: &Fixture, list: &[Action], context: ExecutionContext) -> ExecutionReport {
        let params = EventParams::new();
        fixture
            .dispatcher
            .execute(list, &Invocation::new(context, &params, Duration::ZERO))
    }

    #[test]
    fn assignment_ops() {
        let fx = fixture();
        fx.cells.create("x", Value::from(10.0));
        let list = actions(json!([
            { "type": "assignCell", "target": "x", "op": "add", "value": { "kind": "literal", "value": 5 } },
            { "type": "assignCell", "target": "x", "op": "mul", "value": { "kind": "literal", "value": 2 } },
            { "type": "assignCell", "target": "x", "op": "sub", "value": { "kind": "literal", "value": 6 } },
            { "type": "assignCell", "target": "x", "op": "div", "value": { "kind": "literal", "value": 0 } },
            { "type": "assignCell", "target": "x", "op": "div", "value": { "kind": "literal", "value": 4 } },
            { "type": "assignCell", "target": "ghost", "value": { "kind": "literal", "value": 1 } }
        ]));

        let report = run(&fx, &list, ExecutionContext::LowLatency);

        assert!(report.is_clean());
        assert_eq!(report.executed, 6);
        assert_eq!(fx.cells.read_number("x"), 6.0);
        assert!(!fx.cells.contains("ghost"));
    }

    #[test]
    fn set_keeps_cell_type() {
        let fx = fixture();
        fx.cells.create("flag", Value::from(false));
        let list = actions(json!([
            { "type": "assignCell", "target": "flag", "value": { "kind": "literal", "value": 1 } }
        ]));

        run(&fx, &list, ExecutionContext::LowLatency);
        assert_eq!(fx.cells.read("flag"), Some(Value::Bool(true)));
    }

    #[test]
    fn branch_runs_exactly_one_side() {
        let fx = fixture();
        fx.cells.create("x", Value::from(0.0));
        fx.cells.create("hits", Value::from(0.0));
        let list = actions(json!([{
            "type": "branch",
            "condition": {
                "kind": "conditional",
                "left": { "kind": "cell", "id": "x" }, "cmp": ">", "right": { "kind": "literal", "value": 0 },
                "then": { "kind": "literal", "value": true }, "else": { "kind": "literal", "value": false }
            },
            "then": [{ "type": "assignCell", "target": "hits", "op": "add", "value": { "kind": "literal", "value": 1 } }],
            "else": [{ "type": "assignCell", "target": "hits", "op": "sub", "value": { "kind": "literal", "value": 1 } }]
        }]));

        run(&fx, &list, ExecutionContext::LowLatency);
        assert_eq!(fx.cells.read_number("hits"), -1.0);

        fx.cells.write("x", Value::from(3.0));
        run(&fx, &list, ExecutionContext::LowLatency);
        assert_eq!(fx.cells.read_number("hits"), 0.0);
    }

    #[test]
    fn empty_lists_and_bodies_are_fine() {
        let fx = fixture();
        let list = actions(json!([{ "type": "branch", "condition": { "kind": "literal", "value": 1 } }]));

        assert_eq!(run(&fx, &[], ExecutionContext::LowLatency).executed, 0);
        assert!(run(&fx, &list, ExecutionContext::FullCapability).is_clean());
    }

    #[test]
    fn data_mutation_from_low_latency_is_reported() {
        let fx = fixture();
        let list = actions(json!([
            { "type": "dataCreate", "collection": "todos", "record": { "title": "x" } },
            { "type": "playEffect", "name": "pop" }
        ]));

        let report = run(&fx, &list, ExecutionContext::LowLatency);

        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0],
            RuntimeError::ContextViolation {
                action: "dataCreate",
                context: ExecutionContext::LowLatency
            }
        ));
        assert_eq!(report.executed, 1);
        assert!(fx.data.get_all("todos").is_empty());
        assert_eq!(fx.effects.pending(), 1);
    }

    #[test]
    fn full_capability_actions_are_forwarded() {
        let fx = fixture();
        fx.cells.create("x", Value::from(0.0));
        let list = actions(json!([
            { "type": "startTimer", "id": "t", "interval": 50, "actions": [] },
            { "type": "assignCell", "target": "x", "value": { "kind": "param", "name": "dx" }, "context": "fullCapability" }
        ]));
        let params = EventParams::from([("dx".to_string(), 7.0)]);

        let report = fx.dispatcher.execute(
            &list,
            &Invocation::new(ExecutionContext::LowLatency, &params, Duration::ZERO),
        );
        assert_eq!(report.forwarded, 2);
        assert!(!fx.scheduler.lock().is_active("ns", "t"));
        assert_eq!(fx.cells.read_number("x"), 0.0);

        let drained = fx.dispatcher.run_forwarded(Duration::ZERO);
        assert_eq!(drained.executed, 2);
        assert!(fx.scheduler.lock().is_active("ns", "t"));
        assert_eq!(fx.cells.read_number("x"), 7.0);
    }

    #[test]
    fn templated_data_actions_resolve_against_item() {
        let fx = fixture();
        fx.data
            .create_record("todos", serde_json::from_value(json!({ "id": "a", "done": false })).unwrap());
        let list = actions(json!([
            { "type": "dataUpdate", "collection": "todos", "id": "{{item.id}}", "patch": { "done": "{{item.next}}" } }
        ]));
        let scope = ItemScope::new("item", json!({ "id": "a", "next": true }));
        let params = EventParams::new();

        let report = fx.dispatcher.execute(
            &list,
            &Invocation::new(ExecutionContext::FullCapability, &params, Duration::ZERO)
                .with_scope(Some(&scope)),
        );

        assert!(report.is_clean());
        assert_eq!(fx.data.get_all("todos")[0]["done"], json!(true));
    }

    #[test]
    fn animate_uses_configured_defaults() {
        let fx = fixture();
        let list = actions(json!([
            { "type": "animate", "target": "x", "to": { "kind": "literal", "value": 1 } },
            { "type": "animate", "target": "y", "to": { "kind": "literal", "value": 2 }, "durationMs": 50, "curve": "spring" }
        ]));

        run(&fx, &list, ExecutionContext::LowLatency);

        assert_eq!(
            *fx.renderer.requests.lock(),
            vec![
                ("x".to_string(), 1.0, Duration::from_millis(300), Curve::EaseInOut),
                ("y".to_string(), 2.0, Duration::from_millis(50), Curve::Spring),
            ]
        );
    }

    #[test]
    fn random_assign_stays_in_range() {
        let fx = fixture();
        fx.cells.create("r", Value::from(0.0));
        fx.cells.create("fixed", Value::from(0.0));
        let list = vec![
            Action::from(ActionKind::RandomAssign {
                target: "r".into(),
                min: 2.0,
                max: 3.0,
            }),
            Action::from(ActionKind::RandomAssign {
                target: "fixed".into(),
                min: 5.0,
                max: 5.0,
            }),
        ];

        for _ in 0..50 {
            run(&fx, &list, ExecutionContext::LowLatency);
            let r = fx.cells.read_number("r");
            assert!((2.0..3.0).contains(&r));
        }
        assert_eq!(fx.cells.read_number("fixed"), 5.0);
    }

    #[test]
    fn random_assign_survives_extreme_bounds() {
        let fx = fixture();
        fx.cells.create("wide", Value::from(0.0));
        fx.cells.create("inf", Value::from(7.0));
        let list = vec![
            Action::from(ActionKind::RandomAssign {
                target: "wide".into(),
                min: -1.5e308,
                max: 1.5e308,
            }),
            Action::from(ActionKind::RandomAssign {
                target: "inf".into(),
                min: 0.0,
                max: f64::INFINITY,
            }),
        ];

        for _ in 0..20 {
            let report = run(&fx, &list, ExecutionContext::LowLatency);
            assert!(report.is_clean());
            let wide = fx.cells.read_number("wide");
            assert!(wide.is_finite() && (-1.5e308..=1.5e308).contains(&wide));
        }
        assert_eq!(fx.cells.read("inf"), Some(Value::Number(7.0)));
    }

    #[test]
    fn arithmetic_keeps_cell_type() {
        let fx = fixture();
        fx.cells.create("flag", Value::from(true));
        fx.cells.create("label", Value::from("4"));
        let list = actions(json!([
            { "type": "assignCell", "target": "flag", "op": "add", "value": { "kind": "literal", "value": 1 } },
            { "type": "assignCell", "target": "label", "op": "mul", "value": { "kind": "literal", "value": 2 } }
        ]));

        run(&fx, &list, ExecutionContext::LowLatency);

        assert_eq!(fx.cells.read("flag"), Some(Value::Bool(true)));
        assert_eq!(fx.cells.read("label"), Some(Value::from("8")));

        let zero = actions(json!([
            { "type": "assignCell", "target": "flag", "op": "sub", "value": { "kind": "literal", "value": 1 } }
        ]));
        run(&fx, &zero, ExecutionContext::LowLatency);
        assert_eq!(fx.cells.read("flag"), Some(Value::Bool(false)));
    }

    #[test]
    fn delay_registers_one_shot_timer() {
        let fx = fixture();
        let list = vec![Action::from(ActionKind::Delay {
            ms: 100,
            actions: vec![Action::from(ActionKind::Log {
                message: "later".into(),
                value: Some(Expr::number(1.0)),
            })],
        })];

        run(&fx, &list, ExecutionContext::FullCapability);

        let fired = fx.scheduler.lock().due(
            "ns",
            TimerFamily::WallClock,
            Duration::from_millis(100),
            &fx.cells,
        );
        assert_eq!(fired.len(), 1);
        assert_eq!(fx.scheduler.lock().active_for_namespace("ns"), 0);
    }
}
