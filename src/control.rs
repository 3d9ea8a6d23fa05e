//! Manual control stream
//!
//! The operator's keyboard: `C` forces a commit of whatever is pending, `P`
//! (or `R`) clears the table. One command per line, case-insensitive.

use std::time::Duration;

use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};

use crate::dispatcher::EventSender;
use crate::domain::{ControlSignal, GameEvent};
use crate::error::Result;
use crate::ingest::{next_line, Line};
use crate::shutdown::ShutdownListener;

const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

pub fn parse_control(line: &str) -> Option<ControlSignal> {
    let key = line.trim();
    if key.eq_ignore_ascii_case("c") || key.eq_ignore_ascii_case("confirm") {
        Some(ControlSignal::ForceCommit)
    } else if key.eq_ignore_ascii_case("p")
        || key.eq_ignore_ascii_case("r")
        || key.eq_ignore_ascii_case("reset")
    {
        Some(ControlSignal::ForceReset)
    } else {
        None
    }
}

/// Forward control commands from `reader` until EOF or shutdown.
///
/// Undecodable or oversized lines and read errors are logged and skipped.
pub async fn run_control<R>(
    mut reader: R,
    events: EventSender,
    mut shutdown: ShutdownListener,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    info!("Control input ready (C = force commit, P = reset)");
    let mut buf = Vec::with_capacity(16);
    loop {
        let read = tokio::select! {
            _ = shutdown.wait() => break,
            read = next_line(&mut reader, &mut buf) => read,
        };
        match read {
            Ok(Line::Eof) => {
                debug!("Control input closed");
                break;
            }
            Ok(Line::Oversized) => warn!("Oversized control line ignored"),
            Ok(Line::Complete) => {
                let Ok(line) = std::str::from_utf8(&buf) else {
                    warn!(bytes = buf.len(), "Undecodable control line ignored");
                    continue;
                };
                match parse_control(line) {
                    Some(signal) => {
                        info!(signal = %signal, "Manual control");
                        events.send(GameEvent::Control(signal)).await?;
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!(input = line.trim(), "Unknown control key"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Control input read failed");
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(READ_RETRY_DELAY) => {}
                }
            }
        }
    }
    Ok(())
}
