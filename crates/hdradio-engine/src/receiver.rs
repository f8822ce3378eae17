//! Receive loop
//!
//! Polls the transport, reassembles frames and applies each REPLY to the
//! state store. Requests echoed back by the tuner are parsed but ignored.

use std::sync::Arc;

use hdradio_protocol::display::{annotate_frame, hex_dump};
use hdradio_protocol::{Message, Operation, StreamParser};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::radio::Shared;

pub(crate) async fn run_receiver(shared: Arc<Shared>) {
    let mut parser = StreamParser::new();
    let poll = shared.config.receive_poll();
    let max_read = shared.config.max_read;

    info!("Receiver started");

    loop {
        let read = {
            let mut transport = shared.transport.lock().await;
            if !transport.is_open() {
                debug!("Transport closed, receiver exiting");
                break;
            }
            transport.read(max_read).await
        };

        match read {
            Ok(bytes) if bytes.is_empty() => sleep(poll).await,
            Ok(bytes) => {
                parser.push_bytes(&bytes);
                while let Some((msg, raw)) = parser.next_message_with_bytes() {
                    trace_frame("RX", &raw);
                    handle_message(&shared, msg);
                }
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                shared.fail(e.kind());
                break;
            }
        }
    }

    let stats = parser.stats();
    debug!("Receiver stopped ({:?})", stats);
}

/// Log one frame with its decoded summary
pub(crate) fn trace_frame(direction: &str, frame: &[u8]) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    match annotate_frame(frame) {
        Some(annotated) => trace!("{} {} [{}]", direction, annotated.summary, hex_dump(frame)),
        None => trace!("{} [{}]", direction, hex_dump(frame)),
    }
}

fn handle_message(shared: &Shared, msg: Message) {
    if msg.operation != Operation::Reply {
        trace!("Ignoring {} {}", msg.operation, msg.command);
        return;
    }

    let applied = shared.state.apply(&msg);
    if let Some(event) = applied.event {
        shared.events.emit(event);
    }
    if let Some(hook) = applied.hook {
        shared.power.notify(hook);
    }
}
