//! Event channel implementation using crossbeam-channel.
//!
//! Provides a thread-safe way to send events from the pipeline to
//! whatever is watching the run.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::IngestEvent;

/// Sends events from the pipeline.
///
/// A thin wrapper around crossbeam's Sender that can be cloned and
/// shared across batch workers.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<IngestEvent>,
}

impl EventSender {
    /// Create a new EventSender from a raw crossbeam sender.
    pub fn new(sender: Sender<IngestEvent>) -> Self {
        Self { inner: sender }
    }

    /// Send an event. Non-blocking if the channel isn't full.
    ///
    /// If the receiver is dropped, the event is silently discarded.
    /// Progress reporting must never abort the run.
    pub fn send(&self, event: IngestEvent) {
        let _ = self.inner.send(event);
    }
}

/// Receives events from the pipeline.
pub struct EventReceiver {
    inner: Receiver<IngestEvent>,
}

impl EventReceiver {
    /// Block until the next event is received
    pub fn recv(&self) -> Option<IngestEvent> {
        self.inner.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<IngestEvent> {
        self.inner.try_recv().ok()
    }

    /// Returns an iterator over received events
    pub fn iter(&self) -> impl Iterator<Item = IngestEvent> + '_ {
        self.inner.iter()
    }
}

/// Factory for event channels between the pipeline and its observers.
pub struct EventChannel;

impl EventChannel {
    /// Create a new unbounded event channel.
    ///
    /// Use this for most cases - events are small and fast.
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }

    /// Create a bounded event channel with the specified capacity.
    ///
    /// Use this if the consumer needs backpressure.
    pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
        let (sender, receiver) = bounded(capacity);
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// A no-op event sender for when no one is watching the run.
///
/// Useful for tests and headless invocations.
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{IngestStage, PipelineEvent, ProgressUpdate};
    use std::thread;

    #[test]
    fn events_can_be_sent_across_threads() {
        let (sender, receiver) = EventChannel::new();

        let handle = thread::spawn(move || {
            sender.send(IngestEvent::Progress(ProgressUpdate {
                stage: IngestStage::Uploading,
                message: "Uploading batch 3".to_string(),
                current_file: None,
                fraction: 0.6,
            }));
        });

        handle.join().unwrap();

        let event = receiver.recv().unwrap();
        match event {
            IngestEvent::Progress(p) => assert_eq!(p.stage, IngestStage::Uploading),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn null_sender_does_not_panic() {
        let sender = null_sender();
        sender.send(IngestEvent::Pipeline(PipelineEvent::Started {
            total_images: 10,
            total_batches: 1,
        }));
        // Should not panic even though no one is receiving
    }

    #[test]
    fn bounded_channel_respects_capacity() {
        let (sender, receiver) = EventChannel::bounded(2);

        let started = || {
            IngestEvent::Pipeline(PipelineEvent::Started {
                total_images: 0,
                total_batches: 0,
            })
        };
        sender.send(started());
        sender.send(started());

        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_none());
    }
}
