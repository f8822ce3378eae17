//! Event delivery
//!
//! Events are queued on an unbounded channel and handed to the application's
//! handler on a dedicated thread, so a slow or blocking handler never stalls
//! the receiver. Delivery order is emission order.

use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::events::RadioEvent;

/// Receives driver events
///
/// Called on the dispatcher thread, one event at a time.
pub trait RadioEventHandler: Send + 'static {
    fn on_event(&mut self, event: RadioEvent);
}

impl<F> RadioEventHandler for F
where
    F: FnMut(RadioEvent) + Send + 'static,
{
    fn on_event(&mut self, event: RadioEvent) {
        self(event)
    }
}

/// Handler that forwards events into an async channel
pub fn channel_handler(tx: mpsc::UnboundedSender<RadioEvent>) -> impl RadioEventHandler {
    move |event: RadioEvent| {
        if tx.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }
}

/// Queue plus worker thread
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<RadioEvent>,
    worker: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn new<H: RadioEventHandler>(mut handler: H) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<RadioEvent>();
        let worker = std::thread::Builder::new()
            .name("hdradio-events".into())
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    handler.on_event(event);
                }
                debug!("Event dispatcher stopped");
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Could not start event thread: {}", e);
                None
            }
        };
        Self { tx, worker }
    }

    /// Queue an event for delivery
    pub fn emit(&self, event: RadioEvent) {
        debug!("Event {}", event);
        if self.tx.send(event).is_err() {
            warn!("Event dispatcher is gone, dropping event");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        // closing the channel lets the worker drain and exit
        let (closed, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.tx, closed));
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_handler_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let dispatcher = EventDispatcher::new(move |event: RadioEvent| {
            sink.lock().unwrap().push(event);
        });

        for v in 0..50 {
            dispatcher.emit(RadioEvent::Volume(v));
        }
        drop(dispatcher);

        let seen = seen.lock().unwrap();
        let expected: Vec<_> = (0..50).map(RadioEvent::Volume).collect();
        assert_eq!(*seen, expected);
    }

    #[tokio::test]
    async fn test_channel_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new(channel_handler(tx));
        dispatcher.emit(RadioEvent::Opened(true));
        dispatcher.emit(RadioEvent::Mute(false));

        assert_eq!(rx.recv().await, Some(RadioEvent::Opened(true)));
        assert_eq!(rx.recv().await, Some(RadioEvent::Mute(false)));
    }

    #[test]
    fn test_slow_handler_does_not_block_emit() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let dispatcher = EventDispatcher::new(move |event: RadioEvent| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            let _ = done_tx.send(event);
        });

        let start = std::time::Instant::now();
        for v in 0..5 {
            dispatcher.emit(RadioEvent::Bass(v));
        }
        assert!(start.elapsed() < std::time::Duration::from_millis(20));

        drop(dispatcher);
        assert_eq!(done_rx.iter().count(), 5);
    }
}
