use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::activity::{Activity, Interval};
use crate::classify::{classify, BrowserSet};
use crate::day::next_local_midnight;
use crate::governor::{
    Escalation, FatalNotifier, Governor, PERMISSION_REMEDIATION, PERMISSION_TITLE,
};
use crate::inspect::{FailureKind, FocusInspector, InspectError, TabResolver};

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(2);

/// Segments shorter than this are treated as focus churn and dropped.
pub const MIN_SEGMENT_MS: i64 = 1000;

#[derive(Clone, Debug)]
pub struct CurrentActivity {
    pub activity: Activity,
    /// When this activity was first observed in the current run of samples.
    pub since: DateTime<Utc>,
}

/// Everything the tracker remembers between ticks.
///
/// `last_boundary == None` is the uninitialized state.
#[derive(Clone, Debug, Default)]
pub struct PollState {
    pub current: Option<CurrentActivity>,
    pub last_boundary: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub(crate) permission_failures: u32,
}

impl PollState {
    pub fn is_tracking(&self) -> bool {
        self.last_boundary.is_some()
    }
}

/// The pure part of the tracker: turns one observation into closed intervals.
#[derive(Clone, Debug)]
pub struct SegmentTracker<Tz: TimeZone> {
    tz: Tz,
    min_segment: chrono::Duration,
}

impl<Tz: TimeZone> SegmentTracker<Tz> {
    pub fn new(tz: Tz) -> Self {
        SegmentTracker {
            tz,
            min_segment: chrono::Duration::milliseconds(MIN_SEGMENT_MS),
        }
    }

    /// Applies one tick. The returned intervals belong to the activity that
    /// was current *before* this observation; `observed` only starts accruing
    /// time from `now`.
    pub fn advance(
        &self,
        state: &mut PollState,
        now: DateTime<Utc>,
        observed: Option<Activity>,
    ) -> Vec<Interval> {
        let Some(boundary) = state.last_boundary else {
            state.current = observed.map(|activity| CurrentActivity {
                activity,
                since: now,
            });
            state.last_boundary = Some(now);
            return Vec::new();
        };
        // The wall clock stepped back: keep the committed boundary and wait
        // for time to pass it again.
        if now < boundary {
            debug!("clock moved back {}ms", (boundary - now).num_milliseconds());
            return Vec::new();
        }
        state.last_boundary = Some(now);
        let previous = state.current.take();

        // Idle: nothing is attributed and the next activity starts fresh.
        let Some(observed) = observed else {
            return Vec::new();
        };

        let closed = match &previous {
            Some(prev) if now - boundary >= self.min_segment => {
                split_by_local_day(&self.tz, &prev.activity, boundary, now)
            }
            Some(_) => {
                debug!("dropping {}ms segment", (now - boundary).num_milliseconds());
                Vec::new()
            }
            None => Vec::new(),
        };

        let since = match previous {
            Some(prev) if prev.activity.same_activity(&observed) => prev.since,
            _ => now,
        };
        state.current = Some(CurrentActivity {
            activity: observed,
            since,
        });
        closed
    }
}

/// Cuts `[start, end)` at every local midnight so each piece lies within one
/// calendar date. Empty pieces are never produced.
pub fn split_by_local_day<Tz: TimeZone>(
    tz: &Tz,
    activity: &Activity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<Interval> {
    let mut out = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let piece_end = match next_local_midnight(tz, cursor) {
            Some(m) if m > cursor && m < end => m,
            _ => end,
        };
        out.push(Interval::for_activity(activity, cursor, piece_end));
        cursor = piece_end;
    }
    out
}

/// Where closed intervals go. Failures are logged by the caller and the
/// interval is dropped.
pub trait IntervalSink: Send {
    fn append(&mut self, interval: &Interval) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The observation was applied; `written` intervals reached the sink.
    Applied { written: usize },
    /// The inspector failed and the tick counted as "no activity".
    Failed(FailureKind),
    /// Polling is over for this process.
    Halted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEnd {
    Stopped,
    Halted,
}

/// Inspector, classifier, governor and segment tracker wired together.
pub struct Sampler<I, R, S, Tz: TimeZone> {
    browsers: BrowserSet,
    inspector: I,
    resolver: R,
    sink: S,
    governor: Governor,
    segments: SegmentTracker<Tz>,
    state: PollState,
    halted: bool,
}

impl<I, R, S, Tz> Sampler<I, R, S, Tz>
where
    I: FocusInspector,
    R: TabResolver,
    S: IntervalSink,
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    pub fn new(
        browsers: BrowserSet,
        inspector: I,
        resolver: R,
        sink: S,
        governor: Governor,
        tz: Tz,
    ) -> Self {
        Sampler {
            browsers,
            inspector,
            resolver,
            sink,
            governor,
            segments: SegmentTracker::new(tz),
            state: PollState::default(),
            halted: false,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    async fn observe(&mut self) -> Result<Option<Activity>, InspectError> {
        let Some(window) = self.inspector.inspect_focus().await? else {
            return Ok(None);
        };
        let tab = match self.browsers.recognize(&window) {
            Some(browser) => self.resolver.resolve_tab(browser).await,
            None => None,
        };
        Ok(classify(&self.browsers, Some(&window), tab.as_ref()))
    }

    /// One poll at instant `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.halted {
            return TickOutcome::Halted;
        }

        let (observed, failure) = match self.observe().await {
            Ok(activity) => {
                self.governor.on_success(&mut self.state);
                (activity, None)
            }
            Err(err) => match self.governor.on_failure(&mut self.state, &err) {
                Escalation::Halt => {
                    self.halted = true;
                    return TickOutcome::Halted;
                }
                Escalation::Continue => (None, Some(err.kind())),
            },
        };

        let closed = self.segments.advance(&mut self.state, now, observed);
        let mut written = 0;
        for interval in &closed {
            match self.sink.append(interval).await {
                Ok(()) => written += 1,
                Err(err) => error!(
                    "dropping {} segment ({}ms): {err:#}",
                    interval.identifier,
                    interval.duration_ms()
                ),
            }
        }

        match failure {
            Some(kind) => TickOutcome::Failed(kind),
            None => TickOutcome::Applied { written },
        }
    }

    /// Polls every `period` until cancelled or halted.
    ///
    /// Ticks never overlap: a slow inspector delays the next tick and missed
    /// ticks are skipped. Cancelling lets an in-flight tick finish, and the
    /// open segment since the last boundary is not written.
    pub async fn run(
        mut self,
        period: Duration,
        notifier: &dyn FatalNotifier,
        cancel: CancellationToken,
    ) -> RunEnd {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("tracker started, polling every {}ms", period.as_millis());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Some(boundary) = self.state.last_boundary {
                        info!("tracker stopped; unflushed time since {boundary} is dropped");
                    }
                    return RunEnd::Stopped;
                }
                _ = ticker.tick() => {
                    if self.tick(Utc::now()).await == TickOutcome::Halted {
                        notifier.notify_fatal(PERMISSION_TITLE, PERMISSION_REMEDIATION);
                        return RunEnd::Halted;
                    }
                }
            }
        }
    }
}
