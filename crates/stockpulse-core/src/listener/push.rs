// Push listener: Connecting → Open → (Closing | Faulted) → Reconnecting → …

use chrono::Utc;
use tracing::{debug, error, info, warn};

use stockpulse_api::{InitFrame, Inbound, ReaderFrame, ReaderSocket};

use super::ListenerContext;
use super::backoff::ReconnectBackoff;
use crate::config::ReconnectConfig;
use crate::model::ListenerPhase;

/// How an open session ended.
enum SessionEnd {
    /// The reader closed the stream.
    Closed,
    /// Transport-level failure.
    Faulted,
    /// The listener was stopped.
    Stopped,
}

pub(super) async fn run(mut ctx: ListenerContext, reconnect: ReconnectConfig) {
    let mut backoff = ReconnectBackoff::new(&reconnect);
    ctx.start();
    info!(reader_id = %ctx.reader_id(), url = %ctx.reader.url, "starting push listener");

    loop {
        ctx.set_phase(ListenerPhase::Connecting);
        let connected = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            r = ReaderSocket::connect(
                &ctx.reader.url,
                ctx.reader.api_key.as_ref(),
                reconnect.connect_timeout,
            ) => r,
        };

        match connected {
            Ok(mut socket) => {
                backoff.reset();
                ctx.update(|s| {
                    s.phase = ListenerPhase::Open;
                    s.connected = true;
                    s.reconnect_attempts = 0;
                    s.last_activity = Utc::now();
                });
                info!(reader_id = %ctx.reader_id(), "connected to RFID reader");

                if let Err(e) = socket.send_json(&InitFrame::new(ctx.reader_id())).await {
                    warn!(reader_id = %ctx.reader_id(), error = %e, "failed to send init frame");
                }

                let end = read_frames(&mut ctx, &mut socket).await;
                socket.close().await;
                ctx.update(|s| s.connected = false);

                match end {
                    SessionEnd::Stopped => break,
                    SessionEnd::Closed => ctx.set_phase(ListenerPhase::Closing),
                    SessionEnd::Faulted => {
                        ctx.update(|s| {
                            s.error_count += 1;
                            s.phase = ListenerPhase::Faulted;
                        });
                    }
                }
            }
            Err(e) => {
                warn!(reader_id = %ctx.reader_id(), error = %e, "RFID reader connection failed");
                ctx.update(|s| {
                    s.error_count += 1;
                    s.phase = ListenerPhase::Faulted;
                });
            }
        }

        if ctx.cancel.is_cancelled() {
            break;
        }

        let delay = backoff.advance();
        ctx.update(|s| {
            s.phase = ListenerPhase::Reconnecting;
            s.reconnect_attempts += 1;
        });
        info!(
            reader_id = %ctx.reader_id(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting to RFID reader"
        );

        // A stop during the wait wins over the reconnect.
        if !ctx.pause(delay).await {
            break;
        }
    }

    ctx.finish();
    info!(reader_id = %ctx.reader_id(), "push listener stopped");
}

async fn read_frames(ctx: &mut ListenerContext, socket: &mut ReaderSocket) -> SessionEnd {
    loop {
        let inbound = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return SessionEnd::Stopped,
            Some(_) = ctx.failures.recv() => {
                ctx.record_dispatch_failure();
                continue;
            }
            r = socket.recv() => r,
        };

        match inbound {
            Ok(Inbound::Text(text)) => handle_frame(ctx, &text),
            Ok(Inbound::Closed { code, reason }) => {
                info!(reader_id = %ctx.reader_id(), ?code, %reason, "RFID reader closed connection");
                return SessionEnd::Closed;
            }
            Err(e) => {
                error!(reader_id = %ctx.reader_id(), error = %e, "RFID reader transport error");
                return SessionEnd::Faulted;
            }
        }
    }
}

fn handle_frame(ctx: &ListenerContext, text: &str) {
    let frame = match ReaderFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            error!(reader_id = %ctx.reader_id(), error = %e, "malformed reader frame");
            ctx.record_error();
            return;
        }
    };

    ctx.touch();
    match frame {
        ReaderFrame::Scan { rfid_tags } => {
            if rfid_tags.is_empty() {
                debug!(reader_id = %ctx.reader_id(), "empty scan event");
            } else {
                debug!(reader_id = %ctx.reader_id(), tags = rfid_tags.len(), "scan event");
                ctx.dispatcher.dispatch(rfid_tags);
            }
        }
        ReaderFrame::Status { status } => {
            info!(reader_id = %ctx.reader_id(), status = ?status, "reader status");
        }
        ReaderFrame::Error { error_message } => {
            error!(
                reader_id = %ctx.reader_id(),
                error = error_message.as_deref().unwrap_or("unknown error"),
                "reader reported error"
            );
            ctx.record_error();
        }
        ReaderFrame::Other => {
            debug!(reader_id = %ctx.reader_id(), "ignoring unrecognised reader event");
        }
    }
}
