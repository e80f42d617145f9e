//! Waits for an agent to accept a queued call.
//!
//! [`CallAcceptanceWaitHandler`] polls the connection update endpoint every
//! [`POLL_INTERVAL`] until the call is accepted, reported missed, or
//! [`MAX_WAIT_DURATION`] has passed. The first poll is issued as soon as the
//! session starts; each following poll is issued one interval after the
//! previous one completed.
//!
//! Every session runs on its own tokio task. Status handling and listener
//! callbacks happen on that task under a dispatch lock, and each session
//! carries a generation number: `stop()` bumps the generation and then waits
//! for any callback in progress, so nothing reaches the listener once it
//! returns.

use crate::types::events::CallAcceptanceListener;
use async_trait::async_trait;
use log::{debug, info, warn};
use popin_core::ApiError;
use popin_core::types::{CallQueueId, StatusUpdate};
use popin_core::wait::{
    MAX_WAIT_DURATION, MissReason, POLL_INTERVAL, WaitEvent, WaitSession, WaitState,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Source of queue status for a call queue entry.
#[async_trait]
pub trait ConnectionStatusSource: Send + Sync {
    async fn connection_update(&self, call_queue_id: CallQueueId)
    -> Result<StatusUpdate, ApiError>;
}

pub struct CallAcceptanceWaitHandler {
    shared: Arc<Shared>,
}

struct Shared {
    source: Arc<dyn ConnectionStatusSource>,
    listener: Weak<dyn CallAcceptanceListener>,
    /// Bumped under the `session` lock on every start and stop.
    generation: AtomicU64,
    session: Mutex<SessionSlot>,
    /// Held while a poll result is applied and delivered.
    dispatch: Mutex<()>,
    /// Thread currently running a listener callback, if any.
    dispatching_on: Mutex<Option<ThreadId>>,
}

#[derive(Default)]
struct SessionSlot {
    active: Option<ActiveSession>,
    last_state: WaitState,
}

struct ActiveSession {
    session: WaitSession,
    shutdown: Arc<Notify>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl CallAcceptanceWaitHandler {
    /// Creates an idle handler. Only a weak reference to `listener` is kept.
    pub fn new<L>(source: Arc<dyn ConnectionStatusSource>, listener: &Arc<L>) -> Self
    where
        L: CallAcceptanceListener + 'static,
    {
        let listener = Arc::downgrade(listener);
        let listener: Weak<dyn CallAcceptanceListener> = listener;
        Self::with_weak_listener(source, listener)
    }

    pub fn with_weak_listener(
        source: Arc<dyn ConnectionStatusSource>,
        listener: Weak<dyn CallAcceptanceListener>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                listener,
                generation: AtomicU64::new(0),
                session: Mutex::new(SessionSlot::default()),
                dispatch: Mutex::new(()),
                dispatching_on: Mutex::new(None),
            }),
        }
    }

    /// Starts waiting on `call_queue_id`. Must be called from within a tokio
    /// runtime.
    ///
    /// Returns `false` and does nothing if a session is already running; use
    /// [`restart`](Self::restart) to replace it.
    pub fn start(&self, call_queue_id: CallQueueId) -> bool {
        let mut slot = lock(&self.shared.session);
        if let Some(active) = &slot.active {
            debug!(
                target: "Popin/AcceptanceWait",
                "Already waiting on call_queue_id={}, ignoring start for {call_queue_id}",
                active.session.call_queue_id()
            );
            return false;
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shutdown = Arc::new(Notify::new());
        slot.active = Some(ActiveSession {
            session: WaitSession::start(call_queue_id),
            shutdown: shutdown.clone(),
        });
        slot.last_state = WaitState::Running;
        drop(slot);

        info!(target: "Popin/AcceptanceWait", "Started polling for call_queue_id={call_queue_id}");
        tokio::spawn(
            self.shared
                .clone()
                .poll_loop(generation, call_queue_id, shutdown),
        );
        true
    }

    /// Cancels any running session and starts a fresh one with its own clock.
    pub fn restart(&self, call_queue_id: CallQueueId) -> bool {
        self.stop();
        self.start(call_queue_id)
    }

    /// Cancels the running session, if any.
    ///
    /// Safe to call from any thread, repeatedly, and from inside a listener
    /// callback. Once it returns no further callbacks are delivered for the
    /// cancelled session.
    pub fn stop(&self) {
        let active = {
            let mut slot = lock(&self.shared.session);
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            let active = slot.active.take();
            if active.is_some() {
                slot.last_state = WaitState::Stopped;
            }
            active
        };

        if let Some(mut active) = active {
            active.session.stop();
            active.shutdown.notify_one();
            info!(
                target: "Popin/AcceptanceWait",
                "Stopped polling for call_queue_id={}",
                active.session.call_queue_id()
            );
        }

        self.shared.wait_for_dispatch();
    }

    /// State of the current session, or of the last one once it has ended.
    pub fn state(&self) -> WaitState {
        let slot = lock(&self.shared.session);
        match &slot.active {
            Some(active) => active.session.state(),
            None => slot.last_state,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Snapshot of the running session.
    pub fn session(&self) -> Option<WaitSession> {
        lock(&self.shared.session)
            .active
            .as_ref()
            .map(|active| active.session.clone())
    }
}

impl Drop for CallAcceptanceWaitHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CallAcceptanceWaitHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallAcceptanceWaitHandler")
            .field("state", &self.state())
            .field("listener_alive", &(self.shared.listener.strong_count() > 0))
            .finish()
    }
}

impl Shared {
    async fn poll_loop(
        self: Arc<Self>,
        generation: u64,
        call_queue_id: CallQueueId,
        shutdown: Arc<Notify>,
    ) {
        let started = Instant::now();
        let deadline = started + MAX_WAIT_DURATION;

        loop {
            if !self.step(generation, call_queue_id, |session| {
                session.advance(started.elapsed())
            }) {
                return;
            }

            let poll = tokio::time::timeout_at(
                deadline,
                self.source.connection_update(call_queue_id),
            );
            tokio::select! {
                result = poll => {
                    match result {
                        Ok(Ok(update)) => {
                            debug!(
                                target: "Popin/AcceptanceWait",
                                "call_queue_id={call_queue_id} status={:?} update={update:?}",
                                update.status()
                            );
                            let applied =
                                self.step(generation, call_queue_id, |session| session.apply(&update));
                            if !applied {
                                return;
                            }
                        }
                        Ok(Err(e)) => {
                            warn!(
                                target: "Popin/AcceptanceWait",
                                "Poll for call_queue_id={call_queue_id} failed: {e}"
                            );
                        }
                        Err(_) => {
                            // Deadline reached mid-request; the next step times the session out.
                            debug!(
                                target: "Popin/AcceptanceWait",
                                "Poll for call_queue_id={call_queue_id} still pending at deadline"
                            );
                            continue;
                        }
                    }
                },
                _ = shutdown.notified() => {
                    debug!(target: "Popin/AcceptanceWait", "Shutdown signaled, abandoning in-flight poll.");
                    return;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {},
                _ = shutdown.notified() => {
                    debug!(target: "Popin/AcceptanceWait", "Shutdown signaled, exiting poll loop.");
                    return;
                }
            }
        }
    }

    /// Applies `f` to the session of `generation` and delivers the resulting
    /// event. Returns whether that session is still running.
    fn step(
        &self,
        generation: u64,
        call_queue_id: CallQueueId,
        f: impl FnOnce(&mut WaitSession) -> Option<WaitEvent>,
    ) -> bool {
        let _dispatch = lock(&self.dispatch);

        let (event, running) = {
            let mut slot = lock(&self.session);
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            let Some(active) = slot.active.as_mut() else {
                return false;
            };
            let event = f(&mut active.session);
            let state = active.session.state();
            if !state.is_running() {
                if state.is_terminal() {
                    debug!(
                        target: "Popin/AcceptanceWait",
                        "call_queue_id={call_queue_id} finished as {state:?}"
                    );
                }
                slot.active = None;
                slot.last_state = state;
            }
            (event, state.is_running())
        };

        if let Some(event) = event {
            self.deliver(generation, call_queue_id, event);
        }
        running
    }

    fn deliver(&self, generation: u64, call_queue_id: CallQueueId, event: WaitEvent) {
        match event {
            WaitEvent::QueuePositionChanged(position) => {
                debug!(target: "Popin/AcceptanceWait", "call_queue_id={call_queue_id} position={position}");
            }
            WaitEvent::CallAccepted(call_id) => {
                info!(target: "Popin/AcceptanceWait", "call_queue_id={call_queue_id} accepted, call_id={call_id}");
            }
            WaitEvent::CallMissed(MissReason::Reported) => {
                info!(target: "Popin/AcceptanceWait", "call_queue_id={call_queue_id} reported missed");
            }
            WaitEvent::CallMissed(MissReason::TimedOut) => {
                info!(
                    target: "Popin/AcceptanceWait",
                    "call_queue_id={call_queue_id} timed out after {} seconds",
                    MAX_WAIT_DURATION.as_secs()
                );
            }
        }

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(target: "Popin/AcceptanceWait", "Session cancelled, dropping {event:?}");
            return;
        }
        let Some(listener) = self.listener.upgrade() else {
            debug!(target: "Popin/AcceptanceWait", "Listener gone, dropping {event:?}");
            return;
        };

        *lock(&self.dispatching_on) = Some(thread::current().id());
        let _reset = scopeguard::guard((), |_| *lock(&self.dispatching_on) = None);

        match event {
            WaitEvent::QueuePositionChanged(position) => listener.on_queue_position_change(position),
            WaitEvent::CallAccepted(call_id) => listener.on_call_accepted(call_id),
            WaitEvent::CallMissed(_) => listener.on_call_missed(),
        }
    }

    /// Blocks until an in-progress callback finishes, unless it is running
    /// on this very thread (a listener calling `stop()`).
    fn wait_for_dispatch(&self) {
        if *lock(&self.dispatching_on) == Some(thread::current().id()) {
            return;
        }
        drop(lock(&self.dispatch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{PollReply, RecordingListener, ScriptedStatusSource};
    use crate::types::events::AcceptanceEvent;
    use std::time::Duration;

    fn handler_with(
        source: &Arc<ScriptedStatusSource>,
        listener: &Arc<RecordingListener>,
    ) -> CallAcceptanceWaitHandler {
        CallAcceptanceWaitHandler::new(source.clone(), listener)
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_changes_are_deduplicated() {
        let source = ScriptedStatusSource::new(vec![
            PollReply::Update(StatusUpdate::queued(5)),
            PollReply::Update(StatusUpdate::queued(5)),
            PollReply::Update(StatusUpdate::queued(2)),
        ]);
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        assert!(handler.start(42));
        advance(7).await;

        assert_eq!(
            listener.events(),
            vec![
                AcceptanceEvent::QueuePositionChanged(5),
                AcceptanceEvent::QueuePositionChanged(2),
            ]
        );
        assert!(source.polled_ids().iter().all(|id| *id == 42));
        assert!(handler.is_running());
        handler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_stops_polling() {
        let source = ScriptedStatusSource::new(vec![PollReply::Update(StatusUpdate::accepted(99))])
            .with_fallback(StatusUpdate::queued(1));
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        handler.start(7);
        advance(30).await;

        assert_eq!(listener.events(), vec![AcceptanceEvent::CallAccepted(99)]);
        assert_eq!(source.poll_count(), 1);
        assert_eq!(handler.state(), WaitState::Accepted);
        assert!(handler.session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_miss_stops_polling() {
        let source = ScriptedStatusSource::new(vec![
            PollReply::Update(StatusUpdate::queued(3)),
            PollReply::Update(StatusUpdate::missed()),
        ])
        .with_fallback(StatusUpdate::queued(1));
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        handler.start(7);
        advance(30).await;

        assert_eq!(
            listener.events(),
            vec![
                AcceptanceEvent::QueuePositionChanged(3),
                AcceptanceEvent::CallMissed,
            ]
        );
        assert_eq!(source.poll_count(), 2);
        assert_eq!(handler.state(), WaitState::Missed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_duration() {
        let source = ScriptedStatusSource::new(vec![]).with_fallback(StatusUpdate::queued(1));
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        let started = Instant::now();
        handler.start(7);
        advance(400).await;

        assert_eq!(
            listener.events(),
            vec![
                AcceptanceEvent::QueuePositionChanged(1),
                AcceptanceEvent::CallMissed,
            ]
        );
        let missed_at = listener
            .timed_events()
            .into_iter()
            .find(|(_, e)| *e == AcceptanceEvent::CallMissed)
            .map(|(at, _)| at.duration_since(started))
            .unwrap();
        assert!(missed_at >= MAX_WAIT_DURATION);
        assert!(missed_at <= MAX_WAIT_DURATION + POLL_INTERVAL);
        // One poll every 3s in [0, 300).
        assert_eq!(source.poll_count(), 100);
        assert_eq!(handler.state(), WaitState::Missed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_poll_still_times_out_at_deadline() {
        let source = ScriptedStatusSource::new(vec![]).with_fallback_reply(PollReply::Pending);
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        let started = Instant::now();
        handler.start(7);
        advance(400).await;

        let timed = listener.timed_events();
        assert_eq!(timed.len(), 1);
        assert_eq!(timed[0].1, AcceptanceEvent::CallMissed);
        assert_eq!(timed[0].0.duration_since(started), MAX_WAIT_DURATION);
        assert_eq!(source.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_retries_after_one_interval() {
        let source = ScriptedStatusSource::new(vec![
            PollReply::Fail,
            PollReply::Update(StatusUpdate::queued(4)),
        ]);
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        handler.start(7);
        advance(4).await;

        let times = source.poll_times();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - times[0], POLL_INTERVAL);
        assert_eq!(listener.events(), vec![AcceptanceEvent::QueuePositionChanged(4)]);
        assert!(handler.is_running());
        handler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_response() {
        let source = ScriptedStatusSource::new(vec![PollReply::Delayed(
            Duration::from_secs(2),
            StatusUpdate::accepted(99),
        )]);
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        handler.start(7);
        advance(1).await;
        assert_eq!(source.poll_count(), 1);
        handler.stop();
        advance(30).await;

        assert!(listener.events().is_empty());
        assert_eq!(source.poll_count(), 1);
        assert_eq!(handler.state(), WaitState::Stopped);
        handler.stop();
        assert_eq!(handler.state(), WaitState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_ignored_while_running() {
        let source = ScriptedStatusSource::new(vec![]).with_fallback(StatusUpdate::queued(1));
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        assert_eq!(handler.state(), WaitState::Idle);
        assert!(handler.start(7));
        advance(1).await;
        assert!(!handler.start(8));
        advance(6).await;

        assert_eq!(source.polled_ids(), vec![7, 7, 7]);
        assert_eq!(handler.session().map(|s| s.call_queue_id()), Some(7));
        handler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_session() {
        let source = ScriptedStatusSource::new(vec![]).with_fallback(StatusUpdate::queued(1));
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        handler.start(7);
        advance(1).await;
        assert!(handler.restart(8));
        advance(1).await;

        assert_eq!(source.polled_ids(), vec![7, 8]);
        // Fresh session reports the position again.
        assert_eq!(
            listener.events(),
            vec![
                AcceptanceEvent::QueuePositionChanged(1),
                AcceptanceEvent::QueuePositionChanged(1),
            ]
        );
        let session = handler.session().unwrap();
        assert_eq!(session.call_queue_id(), 8);
        assert_eq!(session.last_known_position(), Some(1));
        handler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_can_start_again_after_terminal_outcome() {
        let source = ScriptedStatusSource::new(vec![
            PollReply::Update(StatusUpdate::missed()),
            PollReply::Update(StatusUpdate::accepted(5)),
        ]);
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        handler.start(7);
        advance(1).await;
        assert_eq!(handler.state(), WaitState::Missed);

        assert!(handler.start(7));
        advance(1).await;
        assert_eq!(
            listener.events(),
            vec![AcceptanceEvent::CallMissed, AcceptanceEvent::CallAccepted(5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_listener_is_tolerated() {
        let source = ScriptedStatusSource::new(vec![
            PollReply::Update(StatusUpdate::queued(2)),
            PollReply::Update(StatusUpdate::accepted(11)),
        ]);
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);
        drop(listener);

        handler.start(7);
        advance(10).await;

        assert_eq!(source.poll_count(), 2);
        assert_eq!(handler.state(), WaitState::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handler_stops_polling() {
        let source = ScriptedStatusSource::new(vec![]).with_fallback(StatusUpdate::queued(1));
        let listener = RecordingListener::new();
        let handler = handler_with(&source, &listener);

        handler.start(7);
        advance(4).await;
        let polls = source.poll_count();
        drop(handler);
        advance(30).await;

        assert_eq!(source.poll_count(), polls);
    }

    struct StopOnFirstPosition {
        handler: Mutex<Option<Arc<CallAcceptanceWaitHandler>>>,
        recorded: Arc<RecordingListener>,
    }

    impl CallAcceptanceListener for StopOnFirstPosition {
        fn on_queue_position_change(&self, position: u32) {
            self.recorded.on_queue_position_change(position);
            if let Some(handler) = lock(&self.handler).as_ref() {
                handler.stop();
            }
        }

        fn on_call_accepted(&self, call_id: i64) {
            self.recorded.on_call_accepted(call_id);
        }

        fn on_call_missed(&self) {
            self.recorded.on_call_missed();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_inside_callback() {
        let source = ScriptedStatusSource::new(vec![]).with_fallback(StatusUpdate::queued(3));
        let recorded = RecordingListener::new();
        let listener = Arc::new(StopOnFirstPosition {
            handler: Mutex::new(None),
            recorded: recorded.clone(),
        });
        let handler = Arc::new(CallAcceptanceWaitHandler::new(source.clone(), &listener));
        *lock(&listener.handler) = Some(handler.clone());

        handler.start(7);
        advance(30).await;

        assert_eq!(recorded.events(), vec![AcceptanceEvent::QueuePositionChanged(3)]);
        assert_eq!(source.poll_count(), 1);
        assert_eq!(handler.state(), WaitState::Stopped);

        // Break the handler <-> listener cycle.
        lock(&listener.handler).take();
    }
}
