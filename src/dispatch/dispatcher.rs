use super::progress::{DispatchConfig, DispatchOutcome, Progress, StopReason};
use crate::text::split_text;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Pause between inserting a segment and sending it, so the host input can
/// register the new content.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Host capabilities a run delivers through.
///
/// Every method is synchronous: a run only yields at its timed waits, so an
/// insert or send is never interrupted by cancellation.
pub trait DeliverySink {
    type Target;

    /// Finds the input that should receive the next segment.
    fn locate_target(&mut self) -> Option<Self::Target>;

    fn insert(&mut self, target: &mut Self::Target, text: &str);

    /// Submits whatever was inserted. Returns `false` when the host refused.
    fn trigger_send(&mut self, target: &mut Self::Target) -> bool;

    fn on_progress(&mut self, _progress: Progress) {}

    /// Called once at the end of every run that had something to send.
    fn on_terminal(&mut self, _sent: usize, _cancelled: bool) {}
}

/// Sends text as a sequence of messages, one segment at a time.
///
/// Clones share the same state, so one handle can run while another cancels
/// or watches progress. Only one run may be active; a second `start` while
/// running returns immediately without doing anything.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    running: AtomicBool,
    cancel_requested: AtomicBool,
    progress_tx: watch::Sender<Progress>,
}

// Returns the dispatcher to idle even if the run future is dropped mid-way.
struct RunGuard<'a> {
    inner: &'a DispatcherInner,
}

impl RunGuard<'_> {
    /// Publishes the run's last progress, then releases the busy flag, so a
    /// run started right after never has its progress overwritten.
    fn finish(self, progress: Progress) {
        self.inner.progress_tx.send_replace(progress);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            inner: Arc::new(DispatcherInner {
                running: AtomicBool::new(false),
                cancel_requested: AtomicBool::new(false),
                progress_tx,
            }),
        }
    }

    pub async fn start<S: DeliverySink>(
        &self,
        text: &str,
        config: &DispatchConfig,
        sink: &mut S,
    ) -> DispatchOutcome {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Line-by-line send already in progress, ignoring new request");
            return DispatchOutcome::idle(StopReason::Busy);
        }

        let guard = RunGuard { inner: &self.inner };
        self.inner.cancel_requested.store(false, Ordering::SeqCst);

        let mut segments = split_text(text, config.separator);
        segments.truncate(config.max_segments);
        let total = segments.len();

        if total == 0 {
            debug!("No segments to send after normalization");
            return DispatchOutcome::idle(StopReason::Empty);
        }

        self.inner.progress_tx.send_replace(Progress::new(total));
        info!(
            "📨 Sending {} segment(s) by {} ({}ms apart)",
            total,
            config.separator,
            config.delay.as_millis()
        );

        let mut sent = 0;
        let mut stop = StopReason::Completed;

        for (index, segment) in segments.iter().enumerate() {
            if self.cancel_requested() {
                stop = StopReason::Cancelled;
                break;
            }

            self.inner
                .progress_tx
                .send_modify(|progress| progress.current = index + 1);
            sink.on_progress(self.progress());

            let Some(mut target) = sink.locate_target() else {
                error!("Could not find the message input, stopping after {} sent", sent);
                stop = StopReason::TargetMissing;
                break;
            };

            debug!(
                "Inserting segment {}/{} ({} characters)",
                index + 1,
                total,
                segment.chars().count()
            );
            sink.insert(&mut target, segment);

            time::sleep(SETTLE_DELAY).await;

            if !sink.trigger_send(&mut target) {
                error!("Could not send segment {}/{}, stopping", index + 1, total);
                stop = StopReason::SendRejected;
                break;
            }

            sent += 1;

            if index + 1 < total && !self.cancel_requested() {
                time::sleep(config.delay).await;
            }
        }

        let cancelled = self.cancel_requested();
        if cancelled && stop == StopReason::Completed {
            stop = StopReason::Cancelled;
        }

        guard.finish(Progress {
            current: sent,
            total,
            cancelled,
        });

        match stop {
            StopReason::Cancelled => info!("🛑 Cancelled after {} of {} segment(s)", sent, total),
            StopReason::Completed => info!("✅ Sent {} segment(s)", sent),
            other => warn!("Stopped after {} of {} segment(s): {}", sent, total, other),
        }

        sink.on_terminal(sent, cancelled);

        DispatchOutcome {
            sent,
            cancelled,
            stop,
        }
    }

    /// Asks the active run to stop at its next checkpoint. No effect when idle.
    pub fn cancel(&self) {
        if !self.is_running() {
            return;
        }
        self.inner.cancel_requested.store(true, Ordering::SeqCst);
        self.inner
            .progress_tx
            .send_modify(|progress| progress.cancelled = true);
        debug!("Cancellation requested");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> Progress {
        *self.inner.progress_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.inner.progress_tx.subscribe()
    }

    fn cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::Separator;
    use tokio::time::Instant;

    #[derive(Default)]
    struct FakeSink {
        inserted: Vec<String>,
        locates: usize,
        sends: usize,
        progress: Vec<Progress>,
        terminal: Vec<(usize, bool)>,
        missing_target_at: Option<usize>,
        reject_send_at: Option<usize>,
        cancel_after_send: Option<(usize, Dispatcher)>,
    }

    struct FakeTarget;

    impl DeliverySink for FakeSink {
        type Target = FakeTarget;

        fn locate_target(&mut self) -> Option<FakeTarget> {
            self.locates += 1;
            if self.missing_target_at == Some(self.locates) {
                None
            } else {
                Some(FakeTarget)
            }
        }

        fn insert(&mut self, _target: &mut FakeTarget, text: &str) {
            self.inserted.push(text.to_string());
        }

        fn trigger_send(&mut self, _target: &mut FakeTarget) -> bool {
            self.sends += 1;
            if self.reject_send_at == Some(self.sends) {
                return false;
            }
            if let Some((after, dispatcher)) = &self.cancel_after_send {
                if *after == self.sends {
                    dispatcher.cancel();
                }
            }
            true
        }

        fn on_progress(&mut self, progress: Progress) {
            self.progress.push(progress);
        }

        fn on_terminal(&mut self, sent: usize, cancelled: bool) {
            self.terminal.push((sent, cancelled));
        }
    }

    fn lines(count: usize) -> String {
        (1..=count)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn line_config(delay_ms: u64) -> DispatchConfig {
        DispatchConfig::new(Separator::Line, delay_ms, 10)
    }

    #[tokio::test(start_paused = true)]
    async fn sends_every_segment_in_order() {
        let dispatcher = Dispatcher::new();
        let mut sink = FakeSink::default();
        let started = Instant::now();

        let outcome = dispatcher
            .start(&lines(3), &line_config(500), &mut sink)
            .await;

        assert_eq!(outcome.sent, 3);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.stop, StopReason::Completed);
        assert_eq!(sink.inserted, vec!["line 1", "line 2", "line 3"]);
        assert_eq!(
            sink.progress.iter().map(|p| p.current).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(sink.progress.iter().all(|p| p.total == 3));
        assert_eq!(sink.terminal, vec![(3, false)]);
        // Three settle delays plus two gaps between segments.
        assert_eq!(started.elapsed(), Duration::from_millis(3 * 100 + 2 * 500));
        assert!(!dispatcher.is_running());
        assert_eq!(
            dispatcher.progress(),
            Progress {
                current: 3,
                total: 3,
                cancelled: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_send_is_rejected() {
        let dispatcher = Dispatcher::new();
        let mut sink = FakeSink {
            reject_send_at: Some(3),
            ..Default::default()
        };

        let outcome = dispatcher
            .start(&lines(5), &line_config(300), &mut sink)
            .await;

        assert_eq!(outcome.sent, 2);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.stop, StopReason::SendRejected);
        assert_eq!(sink.inserted.len(), 3);
        assert_eq!(sink.locates, 3);
        assert_eq!(sink.terminal, vec![(2, false)]);
        assert_eq!(dispatcher.progress().current, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_target_disappears() {
        let dispatcher = Dispatcher::new();
        let mut sink = FakeSink {
            missing_target_at: Some(2),
            ..Default::default()
        };

        let outcome = dispatcher
            .start(&lines(4), &line_config(300), &mut sink)
            .await;

        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.stop, StopReason::TargetMissing);
        assert!(outcome.stop.is_abort());
        assert_eq!(sink.inserted, vec!["line 1"]);
        assert_eq!(sink.sends, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_a_send_stops_before_the_next_segment() {
        let dispatcher = Dispatcher::new();
        let mut sink = FakeSink {
            cancel_after_send: Some((2, dispatcher.clone())),
            ..Default::default()
        };
        let started = Instant::now();

        let outcome = dispatcher
            .start(&lines(5), &line_config(1000), &mut sink)
            .await;

        assert_eq!(outcome.sent, 2);
        assert!(outcome.cancelled);
        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert_eq!(sink.inserted.len(), 2);
        assert_eq!(sink.sends, 2);
        assert_eq!(sink.terminal, vec![(2, true)]);
        // The wait after the cancelling segment is skipped.
        assert_eq!(started.elapsed(), Duration::from_millis(2 * 100 + 1000));
        assert_eq!(
            dispatcher.progress(),
            Progress {
                current: 2,
                total: 5,
                cancelled: true
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_a_wait_takes_effect_at_the_next_segment() {
        let dispatcher = Dispatcher::new();
        let canceller = dispatcher.clone();
        let mut sink = FakeSink::default();

        let text = lines(5);
        let config = line_config(1000);
        let (outcome, _) = tokio::join!(
            dispatcher.start(&text, &config, &mut sink),
            async {
                time::sleep(Duration::from_millis(1500)).await;
                assert!(canceller.is_running());
                canceller.cancel();
            }
        );

        assert_eq!(outcome.sent, 2);
        assert!(outcome.cancelled);
        assert_eq!(sink.inserted, vec!["line 1", "line 2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_a_second_run_while_busy() {
        let dispatcher = Dispatcher::new();
        let second = dispatcher.clone();
        let mut first_sink = FakeSink::default();
        let mut second_sink = FakeSink::default();

        let text = lines(3);
        let config = line_config(300);
        let (first, rejected) = tokio::join!(
            dispatcher.start(&text, &config, &mut first_sink),
            async {
                time::sleep(Duration::from_millis(50)).await;
                second
                    .start(&lines(2), &line_config(300), &mut second_sink)
                    .await
            }
        );

        assert_eq!(first.sent, 3);
        assert_eq!(rejected.sent, 0);
        assert!(!rejected.cancelled);
        assert_eq!(rejected.stop, StopReason::Busy);
        assert!(second_sink.inserted.is_empty());
        assert!(second_sink.terminal.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn truncates_to_the_segment_cap() {
        let dispatcher = Dispatcher::new();
        let mut sink = FakeSink::default();
        let config = DispatchConfig::new(Separator::Line, 300, 5);

        let outcome = dispatcher.start(&lines(8), &config, &mut sink).await;

        assert_eq!(outcome.sent, 5);
        assert_eq!(sink.inserted.last().map(String::as_str), Some("line 5"));
        assert!(sink.progress.iter().all(|p| p.total == 5));
    }

    #[tokio::test(start_paused = true)]
    async fn blank_text_sends_nothing() {
        let dispatcher = Dispatcher::new();
        let mut sink = FakeSink::default();

        let outcome = dispatcher
            .start(" \r\n\u{200B}\n", &line_config(300), &mut sink)
            .await;

        assert_eq!(outcome.sent, 0);
        assert_eq!(outcome.stop, StopReason::Empty);
        assert_eq!(sink.locates, 0);
        assert!(sink.terminal.is_empty());
        assert!(!dispatcher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_run_returns_to_idle() {
        let dispatcher = Dispatcher::new();
        let mut sink = FakeSink::default();

        let result = time::timeout(
            Duration::from_millis(150),
            dispatcher.start(&lines(5), &line_config(1000), &mut sink),
        )
        .await;

        assert!(result.is_err());
        assert!(!dispatcher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn new_run_clears_previous_cancellation() {
        let dispatcher = Dispatcher::new();
        let mut cancelling = FakeSink {
            cancel_after_send: Some((1, dispatcher.clone())),
            ..Default::default()
        };
        let first = dispatcher
            .start(&lines(3), &line_config(300), &mut cancelling)
            .await;
        assert!(first.cancelled);

        let mut sink = FakeSink::default();
        let second = dispatcher
            .start(&lines(3), &line_config(300), &mut sink)
            .await;
        assert_eq!(second.sent, 3);
        assert!(!second.cancelled);
        assert!(!dispatcher.progress().cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_runs_keep_their_own_progress() {
        let first = Dispatcher::new();
        let second = first.clone();
        let mut first_sink = FakeSink::default();
        let mut second_sink = FakeSink::default();

        // The first run finishes at 100 + 300 + 100 ms.
        let text = lines(2);
        let config = line_config(300);
        let (done, next) = tokio::join!(
            first.start(&text, &config, &mut first_sink),
            async {
                time::sleep(Duration::from_millis(600)).await;
                second
                    .start(&lines(4), &line_config(300), &mut second_sink)
                    .await
            }
        );

        assert_eq!(done.sent, 2);
        assert_eq!(next.stop, StopReason::Completed);
        assert!(second_sink.progress.iter().all(|p| p.total == 4));
        assert_eq!(
            first.progress(),
            Progress {
                current: 4,
                total: 4,
                cancelled: false
            }
        );
    }

    #[test]
    fn finishing_a_run_publishes_then_goes_idle() {
        let dispatcher = Dispatcher::new();
        dispatcher.inner.running.store(true, Ordering::SeqCst);
        let guard = RunGuard {
            inner: &dispatcher.inner,
        };
        let last = Progress {
            current: 3,
            total: 5,
            cancelled: true,
        };

        guard.finish(last);

        assert_eq!(dispatcher.progress(), last);
        assert!(!dispatcher.is_running());
    }

    #[test]
    fn cancel_is_ignored_when_idle() {
        let dispatcher = Dispatcher::new();
        dispatcher.cancel();
        assert!(!dispatcher.is_running());
        assert_eq!(dispatcher.progress(), Progress::default());
    }
}
