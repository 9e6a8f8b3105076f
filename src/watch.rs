//! Polls a remote job until it reaches a terminal state.
//!
//! The loop is a small state machine:
//!
//! ```text
//! Initial --terminal--> Terminal
//! Initial ------------> Polling --tick, non-terminal--> Polling
//!                       Polling --tick, terminal------> Terminal
//! Initial | Polling --cancel--> Cancelled
//! ```
//!
//! Rendering belongs to the caller through [`WatchObserver`]; a failed read
//! is reported there and polling carries on.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest interval the loop will poll at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What the loop needs to know about a polled job.
pub trait JobState {
    fn id(&self) -> &str;
    fn label(&self) -> String;
    fn is_terminal(&self) -> bool;
}

/// Receives every observation the loop makes.
pub trait WatchObserver<S, E> {
    /// The starting snapshot, when it is not already terminal.
    fn initial(&mut self, state: &S);
    /// One successful read while polling.
    fn polled(&mut self, at: DateTime<Local>, state: &S);
    /// A read failed; the loop keeps going.
    fn poll_failed(&mut self, err: &E);
    /// The job reached a terminal state.
    fn finished(&mut self, state: &S);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Polling,
    Terminal,
    Cancelled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initial => write!(f, "INITIAL"),
            Phase::Polling => write!(f, "POLLING"),
            Phase::Terminal => write!(f, "TERMINAL"),
            Phase::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// How the watch ended, carrying the last state observed.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome<S> {
    Terminal(S),
    Cancelled(S),
}

impl<S> WatchOutcome<S> {
    pub fn state(&self) -> &S {
        match self {
            WatchOutcome::Terminal(s) | WatchOutcome::Cancelled(s) => s,
        }
    }
}

struct WatchSession<S> {
    job_id: String,
    last: S,
    phase: Phase,
}

impl<S: JobState> WatchSession<S> {
    fn new(initial: S) -> Self {
        Self {
            job_id: initial.id().to_string(),
            last: initial,
            phase: Phase::Initial,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(job_id = %self.job_id, from = %self.phase, to = %phase, "watch transition");
        self.phase = phase;
    }

    fn finish(mut self, phase: Phase) -> WatchOutcome<S> {
        self.enter(phase);
        match phase {
            Phase::Terminal => WatchOutcome::Terminal(self.last),
            _ => WatchOutcome::Cancelled(self.last),
        }
    }
}

/// Watches a job from `initial` until it is terminal or `cancel` fires.
///
/// `read` fetches the current state of the same job. Cancellation is a normal
/// exit and produces no further observer calls.
pub async fn watch<S, E, F, Fut, O>(
    cancel: &CancellationToken,
    initial: S,
    poll_interval: Duration,
    mut read: F,
    observer: &mut O,
) -> WatchOutcome<S>
where
    S: JobState,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, E>>,
    O: WatchObserver<S, E>,
{
    let mut session = WatchSession::new(initial);

    if session.last.is_terminal() {
        observer.finished(&session.last);
        return session.finish(Phase::Terminal);
    }
    if cancel.is_cancelled() {
        return session.finish(Phase::Cancelled);
    }

    observer.initial(&session.last);
    session.enter(Phase::Polling);

    let period = poll_interval.max(MIN_POLL_INTERVAL);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return session.finish(Phase::Cancelled),
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return session.finish(Phase::Cancelled),
            result = read() => result,
        };

        match result {
            Err(err) => observer.poll_failed(&err),
            Ok(state) => {
                observer.polled(Local::now(), &state);
                session.last = state;
                if session.last.is_terminal() {
                    observer.finished(&session.last);
                    return session.finish(Phase::Terminal);
                }
            }
        }
    }
}

/// `2024-05-01 10:00:00  Status: planning`
pub fn format_status_line(at: DateTime<Local>, label: &str) -> String {
    format!("{}  Status: {label}", at.format("%Y-%m-%d %H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    struct Job {
        id: &'static str,
        status: &'static str,
    }

    impl JobState for Job {
        fn id(&self) -> &str {
            self.id
        }
        fn label(&self) -> String {
            self.status.to_string()
        }
        fn is_terminal(&self) -> bool {
            matches!(self.status, "applied" | "errored")
        }
    }

    fn job(status: &'static str) -> Job {
        Job { id: "run-1", status }
    }

    #[derive(Debug, PartialEq)]
    enum Event {
        Initial(&'static str),
        Polled(&'static str),
        Warning(String),
        Finished(&'static str),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl WatchObserver<Job, String> for Recorder {
        fn initial(&mut self, state: &Job) {
            self.events.push(Event::Initial(state.status));
        }
        fn polled(&mut self, _at: DateTime<Local>, state: &Job) {
            self.events.push(Event::Polled(state.status));
        }
        fn poll_failed(&mut self, err: &String) {
            self.events.push(Event::Warning(err.clone()));
        }
        fn finished(&mut self, state: &Job) {
            self.events.push(Event::Finished(state.status));
        }
    }

    /// Replays `script` one entry per read and counts reads.
    fn scripted(
        script: Vec<Result<Job, String>>,
    ) -> (impl FnMut() -> std::future::Ready<Result<Job, String>>, Rc<Cell<usize>>) {
        let reads = Rc::new(Cell::new(0));
        let counter = Rc::clone(&reads);
        let mut script: VecDeque<_> = script.into();
        let read = move || {
            counter.set(counter.get() + 1);
            std::future::ready(script.pop_front().unwrap_or_else(|| Err("script exhausted".into())))
        };
        (read, reads)
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_on_entry_does_not_poll() {
        let (read, reads) = scripted(vec![]);
        let mut recorder = Recorder::default();
        let start = Instant::now();

        let outcome = watch(
            &CancellationToken::new(),
            job("applied"),
            DEFAULT_POLL_INTERVAL,
            read,
            &mut recorder,
        )
        .await;

        assert_eq!(outcome, WatchOutcome::Terminal(job("applied")));
        assert_eq!(recorder.events, vec![Event::Finished("applied")]);
        assert_eq!(reads.get(), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_terminal() {
        let (read, reads) = scripted(vec![Ok(job("planning")), Ok(job("applying")), Ok(job("applied"))]);
        let mut recorder = Recorder::default();
        let start = Instant::now();

        let outcome = watch(
            &CancellationToken::new(),
            job("pending"),
            DEFAULT_POLL_INTERVAL,
            read,
            &mut recorder,
        )
        .await;

        assert_eq!(outcome.state(), &job("applied"));
        assert_eq!(
            recorder.events,
            vec![
                Event::Initial("pending"),
                Event::Polled("planning"),
                Event::Polled("applying"),
                Event::Polled("applied"),
                Event::Finished("applied"),
            ]
        );
        assert_eq!(reads.get(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_polls_once_a_second() {
        let (read, reads) = scripted(vec![Ok(job("planning")), Ok(job("planning")), Ok(job("applied"))]);
        let mut recorder = Recorder::default();
        let start = Instant::now();

        watch(&CancellationToken::new(), job("pending"), Duration::ZERO, read, &mut recorder).await;

        assert_eq!(reads.get(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn survives_transient_read_errors() {
        let (read, _) = scripted(vec![
            Ok(job("planning")),
            Err("connection reset".into()),
            Ok(job("errored")),
        ]);
        let mut recorder = Recorder::default();

        let outcome = watch(
            &CancellationToken::new(),
            job("pending"),
            Duration::from_secs(1),
            read,
            &mut recorder,
        )
        .await;

        assert_eq!(outcome, WatchOutcome::Terminal(job("errored")));
        assert_eq!(
            recorder.events,
            vec![
                Event::Initial("pending"),
                Event::Polled("planning"),
                Event::Warning("connection reset".into()),
                Event::Polled("errored"),
                Event::Finished("errored"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_silently() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(7500)).await;
            trigger.cancel();
        });
        let (read, reads) = scripted(vec![Ok(job("planning")), Ok(job("planning")), Ok(job("applied"))]);
        let mut recorder = Recorder::default();

        let outcome = watch(&cancel, job("pending"), DEFAULT_POLL_INTERVAL, read, &mut recorder).await;

        assert_eq!(outcome, WatchOutcome::Cancelled(job("planning")));
        assert_eq!(recorder.events, vec![Event::Initial("pending"), Event::Polled("planning")]);
        assert_eq!(reads.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_emits_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (read, reads) = scripted(vec![]);
        let mut recorder = Recorder::default();

        let outcome = watch(&cancel, job("pending"), DEFAULT_POLL_INTERVAL, read, &mut recorder).await;

        assert!(matches!(outcome, WatchOutcome::Cancelled(_)));
        assert!(recorder.events.is_empty());
        assert_eq!(reads.get(), 0);
    }

    #[test]
    fn status_line_format() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            format_status_line(at, "planning"),
            "2024-05-01 10:00:00  Status: planning"
        );
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Polling.to_string(), "POLLING");
        assert_eq!(Phase::Cancelled.to_string(), "CANCELLED");
    }
}
