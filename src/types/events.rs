use popin_core::types::CallId;
use popin_core::wait::WaitEvent;
use tokio::sync::mpsc;

/// Receives call-acceptance progress.
///
/// Callbacks are synchronous and run on the wait session's task, one at a
/// time. The handler only holds a weak reference: drop the listener to stop
/// receiving callbacks. Calling back into the handler (for example `stop()`)
/// from inside a callback is allowed.
pub trait CallAcceptanceListener: Send + Sync {
    /// The reported queue position changed.
    fn on_queue_position_change(&self, position: u32);

    /// An agent accepted the call. The session has already stopped.
    fn on_call_accepted(&self, call_id: CallId);

    /// The server reported the call as missed, or the wait timed out. The
    /// session has already stopped.
    fn on_call_missed(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceEvent {
    QueuePositionChanged(u32),
    CallAccepted(CallId),
    CallMissed,
}

impl From<WaitEvent> for AcceptanceEvent {
    fn from(event: WaitEvent) -> Self {
        match event {
            WaitEvent::QueuePositionChanged(position) => Self::QueuePositionChanged(position),
            WaitEvent::CallAccepted(call_id) => Self::CallAccepted(call_id),
            WaitEvent::CallMissed(_) => Self::CallMissed,
        }
    }
}

impl AcceptanceEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CallAccepted(_) | Self::CallMissed)
    }
}

/// Forwards listener callbacks into an unbounded channel.
///
/// Keep the `Arc` alive for as long as events are wanted; dropping it (or
/// the receiver) closes the stream.
#[derive(Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<AcceptanceEvent>,
}

impl ChannelListener {
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<AcceptanceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (std::sync::Arc::new(Self { tx }), rx)
    }

    fn send(&self, event: AcceptanceEvent) {
        // A closed receiver just means nobody is interested anymore.
        let _ = self.tx.send(event);
    }
}

impl CallAcceptanceListener for ChannelListener {
    fn on_queue_position_change(&self, position: u32) {
        self.send(AcceptanceEvent::QueuePositionChanged(position));
    }

    fn on_call_accepted(&self, call_id: CallId) {
        self.send(AcceptanceEvent::CallAccepted(call_id));
    }

    fn on_call_missed(&self) {
        self.send(AcceptanceEvent::CallMissed);
    }
}
