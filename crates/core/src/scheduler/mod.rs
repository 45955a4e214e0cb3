//! Timer scheduler.
//!
//! Two families share one registry. Frame timers are checked on every frame
//! tick, quantize their interval to whole frames and may re-evaluate a
//! dynamic interval each tick. Wall-clock timers resolve their interval once
//! at registration. Ids are namespaced as `"{namespace}:{id}"` so several
//! running instances can share one scheduler and be torn down in bulk.
//!
//! The scheduler never runs bodies itself. [`Scheduler::due`] hands back
//! [`FiredTimer`]s and the caller runs them in the matching context, checking
//! [`FiredTimer::is_live`] first since a stop can race an in-flight tick.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::{evaluate_number, Action, CellStore, EventParams, Expr};

/// Scheduler shared between the runtimes that use it.
pub type SchedulerHandle = Arc<Mutex<Scheduler>>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey {
    pub namespace: String,
    pub id: String,
}

impl TimerKey {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFamily {
    Frame,
    WallClock,
}

/// Interval source for a timer.
#[derive(Clone)]
pub enum Interval {
    Fixed(Duration),
    /// Expression evaluated to milliseconds against the cell store.
    Expr(Expr),
    Function(Arc<dyn Fn() -> Duration + Send + Sync>),
}

impl Interval {
    fn resolve(&self, cells: &CellStore) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Expr(expr) => {
                let ms = evaluate_number(expr, cells, &EventParams::new());
                millis(ms)
            }
            Self::Function(f) => f(),
        }
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(interval) => f.debug_tuple("Fixed").field(interval).finish(),
            Self::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            Self::Function(_) => f.write_str("Function"),
        }
    }
}

/// What a timer runs when it fires.
#[derive(Clone)]
pub enum TimerBody {
    Actions(Arc<[Action]>),
    Callback(Arc<Mutex<dyn FnMut() + Send>>),
}

impl TimerBody {
    pub fn actions(actions: Vec<Action>) -> Self {
        Self::Actions(actions.into())
    }

    pub fn callback(f: impl FnMut() + Send + 'static) -> Self {
        Self::Callback(Arc::new(Mutex::new(f)))
    }
}

impl fmt::Debug for TimerBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Actions(actions) => f.debug_tuple("Actions").field(&actions.len()).finish(),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerSpec {
    pub interval: Interval,
    pub body: TimerBody,
    pub family: TimerFamily,
    pub repeat: bool,
    /// Parameters the body's actions see when they run.
    pub params: EventParams,
}

impl TimerSpec {
    pub fn repeating(interval: Interval, body: TimerBody, family: TimerFamily) -> Self {
        Self {
            interval,
            body,
            family,
            repeat: true,
            params: EventParams::new(),
        }
    }

    pub fn once(delay: Duration, body: TimerBody) -> Self {
        Self {
            interval: Interval::Fixed(delay),
            body,
            family: TimerFamily::WallClock,
            repeat: false,
            params: EventParams::new(),
        }
    }
}

#[derive(Debug)]
struct Timer {
    spec: TimerSpec,
    /// Wall-clock interval resolved at registration.
    resolved: Duration,
    last_fired: Duration,
    next_due: Duration,
    live: Arc<AtomicBool>,
}

/// A timer that came due, returned to the caller for execution.
#[derive(Debug, Clone)]
pub struct FiredTimer {
    pub key: TimerKey,
    pub body: TimerBody,
    pub params: EventParams,
    live: Arc<AtomicBool>,
}

impl FiredTimer {
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct Scheduler {
    frame_interval: Duration,
    timers: BTreeMap<TimerKey, Timer>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

impl Scheduler {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            timers: BTreeMap::new(),
        }
    }

    pub fn shared(frame_interval: Duration) -> SchedulerHandle {
        Arc::new(Mutex::new(Self::new(frame_interval)))
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Registers a timer, replacing any live timer with the same key.
    pub fn start(&mut self, key: TimerKey, spec: TimerSpec, now: Duration, cells: &CellStore) {
        self.stop_key(&key);

        let resolved = self.effective_interval(spec.family, spec.interval.resolve(cells));
        tracing::debug!(timer = %key, family = ?spec.family, ?resolved, repeat = spec.repeat, "timer started");
        self.timers.insert(
            key,
            Timer {
                spec,
                resolved,
                last_fired: now,
                next_due: now.saturating_add(resolved),
                live: Arc::new(AtomicBool::new(true)),
            },
        );
    }

    /// Stops a timer. Unknown ids are ignored.
    pub fn stop(&mut self, namespace: &str, id: &str) -> bool {
        self.stop_key(&TimerKey::new(namespace, id))
    }

    pub fn stop_all_for_namespace(&mut self, namespace: &str) -> usize {
        let keys: Vec<TimerKey> = self
            .timers
            .keys()
            .filter(|key| key.namespace == namespace)
            .cloned()
            .collect();
        for key in &keys {
            self.stop_key(key);
        }
        if !keys.is_empty() {
            tracing::debug!(namespace, stopped = keys.len(), "namespace timers stopped");
        }
        keys.len()
    }

    pub fn is_active(&self, namespace: &str, id: &str) -> bool {
        self.timers.contains_key(&TimerKey::new(namespace, id))
    }

    pub fn active_for_namespace(&self, namespace: &str) -> usize {
        self.timers
            .keys()
            .filter(|key| key.namespace == namespace)
            .count()
    }

    /// Collects the `family` timers of `namespace` that are due at `now`.
    ///
    /// Each timer fires at most once per call; a timer that fell behind
    /// resumes its cadence from `now` instead of bursting.
    pub fn due(
        &mut self,
        namespace: &str,
        family: TimerFamily,
        now: Duration,
        cells: &CellStore,
    ) -> Vec<FiredTimer> {
        let frame_interval = self.frame_interval;
        let mut fired = Vec::new();
        let mut finished = Vec::new();

        for (key, timer) in self
            .timers
            .iter_mut()
            .filter(|(key, timer)| key.namespace == namespace && timer.spec.family == family)
        {
            let due_at = match family {
                TimerFamily::Frame => {
                    let interval = quantize(timer.spec.interval.resolve(cells), frame_interval);
                    timer.last_fired.saturating_add(interval)
                }
                TimerFamily::WallClock => timer.next_due,
            };
            if now < due_at {
                continue;
            }

            fired.push(FiredTimer {
                key: key.clone(),
                body: timer.spec.body.clone(),
                params: timer.spec.params.clone(),
                live: timer.live.clone(),
            });
            timer.last_fired = now;
            timer.next_due = timer.next_due.saturating_add(timer.resolved);
            if timer.next_due <= now {
                timer.next_due = now.saturating_add(timer.resolved);
            }
            if !timer.spec.repeat {
                finished.push(key.clone());
            }
        }

        for key in finished {
            self.timers.remove(&key);
        }
        fired
    }

    fn stop_key(&mut self, key: &TimerKey) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.live.store(false, Ordering::Release);
                tracing::debug!(timer = %key, "timer stopped");
                true
            }
            None => false,
        }
    }

    fn effective_interval(&self, family: TimerFamily, interval: Duration) -> Duration {
        match family {
            TimerFamily::Frame => quantize(interval, self.frame_interval),
            TimerFamily::WallClock => interval.max(Duration::from_millis(1)),
        }
    }
}

/// Converts evaluated milliseconds, saturating instead of panicking on
/// negative, huge or infinite input.
pub(crate) fn millis(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}

/// Rounds `interval` up to a whole, non-zero number of frames.
fn quantize(interval: Duration, frame: Duration) -> Duration {
    let frames = (interval.as_nanos()).div_ceil(frame.as_nanos()).max(1);
    frame * u32::try_from(frames).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::Value;

    const FRAME: Duration = Duration::from_millis(16);

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn counting_body() -> (TimerBody, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let body = TimerBody::callback(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (body, count)
    }

    fn run(fired: Vec<FiredTimer>) {
        for timer in fired.into_iter().filter(FiredTimer::is_live) {
            if let TimerBody::Callback(callback) = &timer.body {
                (&mut *callback.lock())();
            }
        }
    }

    #[test]
    fn quantizes_to_whole_frames() {
        assert_eq!(quantize(ms(100), FRAME), ms(112));
        assert_eq!(quantize(ms(0), FRAME), FRAME);
        assert_eq!(quantize(ms(32), FRAME), ms(32));
    }

    #[test]
    fn stop_before_first_tick_suppresses_body() {
        let cells = CellStore::new("ns");
        let mut scheduler = Scheduler::new(FRAME);
        let (body, count) = counting_body();

        scheduler.start(
            TimerKey::new("ns", "t1"),
            TimerSpec::repeating(Interval::Fixed(ms(100)), body, TimerFamily::Frame),
            ms(0),
            &cells,
        );
        assert!(scheduler.stop("ns", "t1"));
        assert!(!scheduler.stop("ns", "t1"));

        for frame in 0..20 {
            run(scheduler.due("ns", TimerFamily::Frame, FRAME * frame, &cells));
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn in_flight_ticks_observe_stop() {
        let cells = CellStore::new("ns");
        let mut scheduler = Scheduler::new(FRAME);
        let (body, count) = counting_body();
        scheduler.start(
            TimerKey::new("ns", "t"),
            TimerSpec::repeating(Interval::Fixed(FRAME), body, TimerFamily::Frame),
            ms(0),
            &cells,
        );

        let fired = scheduler.due("ns", TimerFamily::Frame, FRAME, &cells);
        assert_eq!(fired.len(), 1);
        scheduler.stop("ns", "t");
        run(fired);

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restarting_replaces_existing_timer() {
        let cells = CellStore::new("ns");
        let mut scheduler = Scheduler::new(FRAME);
        let (first, first_count) = counting_body();
        let (second, second_count) = counting_body();
        let key = TimerKey::new("ns", "t");

        scheduler.start(
            key.clone(),
            TimerSpec::repeating(Interval::Fixed(FRAME), first, TimerFamily::WallClock),
            ms(0),
            &cells,
        );
        scheduler.start(
            key,
            TimerSpec::repeating(Interval::Fixed(FRAME), second, TimerFamily::WallClock),
            ms(0),
            &cells,
        );
        run(scheduler.due("ns", TimerFamily::WallClock, ms(20), &cells));

        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_for_namespace("ns"), 1);
    }

    #[test]
    fn dynamic_frame_interval_is_reevaluated() {
        let cells = CellStore::new("ns");
        cells.create("period", Value::from(32.0));
        let mut scheduler = Scheduler::new(FRAME);
        let (body, count) = counting_body();
        scheduler.start(
            TimerKey::new("ns", "pulse"),
            TimerSpec::repeating(Interval::Expr(Expr::cell("period")), body, TimerFamily::Frame),
            ms(0),
            &cells,
        );

        run(scheduler.due("ns", TimerFamily::Frame, ms(16), &cells));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        cells.write("period", Value::from(16.0));
        run(scheduler.due("ns", TimerFamily::Frame, ms(16), &cells));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wall_clock_timers_keep_cadence_without_bursting() {
        let cells = CellStore::new("ns");
        let mut scheduler = Scheduler::new(FRAME);
        let (body, count) = counting_body();
        scheduler.start(
            TimerKey::new("ns", "poll"),
            TimerSpec::repeating(Interval::Fixed(ms(100)), body, TimerFamily::WallClock),
            ms(0),
            &cells,
        );

        run(scheduler.due("ns", TimerFamily::WallClock, ms(99), &cells));
        run(scheduler.due("ns", TimerFamily::WallClock, ms(100), &cells));
        run(scheduler.due("ns", TimerFamily::WallClock, ms(1000), &cells));
        run(scheduler.due("ns", TimerFamily::WallClock, ms(1050), &cells));
        run(scheduler.due("ns", TimerFamily::WallClock, ms(1100), &cells));

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn one_shot_timers_retire_after_firing() {
        let cells = CellStore::new("ns");
        let mut scheduler = Scheduler::new(FRAME);
        let (body, count) = counting_body();
        scheduler.start(TimerKey::new("ns", "once"), TimerSpec::once(ms(50), body), ms(0), &cells);

        run(scheduler.due("ns", TimerFamily::WallClock, ms(60), &cells));
        run(scheduler.due("ns", TimerFamily::WallClock, ms(200), &cells));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_active("ns", "once"));
    }

    #[test]
    fn namespaces_are_isolated() {
        let cells = CellStore::new("a");
        let mut scheduler = Scheduler::new(FRAME);
        let (a_body, a_count) = counting_body();
        let (b_body, b_count) = counting_body();
        scheduler.start(
            TimerKey::new("a", "t"),
            TimerSpec::repeating(Interval::Fixed(FRAME), a_body, TimerFamily::Frame),
            ms(0),
            &cells,
        );
        scheduler.start(
            TimerKey::new("b", "t"),
            TimerSpec::repeating(Interval::Fixed(FRAME), b_body, TimerFamily::Frame),
            ms(0),
            &cells,
        );

        assert_eq!(scheduler.stop_all_for_namespace("a"), 1);
        run(scheduler.due("a", TimerFamily::Frame, FRAME, &cells));
        run(scheduler.due("b", TimerFamily::Frame, FRAME, &cells));

        assert_eq!(a_count.load(Ordering::SeqCst), 0);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert_eq!(TimerKey::new("b", "t").to_string(), "b:t");
    }
}
