//! Scan ingestion
//!
//! Each reader device emits lines of the form `SCAN,<HEX_ID>`. One
//! [`ChannelIngestor`] per device reads them, normalizes the identifier and
//! forwards it to the dispatcher. Anything else on the line stream is ignored;
//! read and decode errors are logged and never end the ingestor.
//!
//! Devices are opened as plain files and must already be in line mode at the
//! right baud rate (e.g. `stty -F /dev/ttyACM0 115200 raw`). A second handle is
//! opened for writing `DISPLAY:` lines back to the reader.

use std::path::Path;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::dispatcher::EventSender;
use crate::domain::{GameEvent, TagId};
use crate::error::Result;
use crate::shutdown::ShutdownListener;

/// Longer lines are garbage from a glitching reader
pub const MAX_LINE_LEN: usize = 256;

const SCAN_PREFIX: &str = "SCAN,";

/// Extract the tag from a `SCAN,<id>` line
pub fn parse_scan_line(line: &str) -> Option<TagId> {
    let body = line.trim().strip_prefix(SCAN_PREFIX)?;
    let id = body.split(',').next()?;
    TagId::normalize(id)
}

/// Why a read pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    Eof,
    Shutdown,
}

/// What [`next_line`] left in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// A newline-terminated line of at most `MAX_LINE_LEN` bytes
    Complete,
    /// Longer than `MAX_LINE_LEN`; the rest up to the newline was skipped
    Oversized,
    Eof,
}

/// Read one line into `buf`, never buffering more than `MAX_LINE_LEN + 1`
/// bytes. A trailing fragment without a newline is dropped at EOF, never
/// carried into the next read.
pub async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_LEN as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() == Some(&b'\n') {
        return Ok(Line::Complete);
    }
    if n as u64 == limit {
        let skipped = discard_rest_of_line(reader).await?;
        debug!(bytes = n + skipped, "Skipped oversized line");
        buf.clear();
        return Ok(Line::Oversized);
    }
    debug!(bytes = n, "Discarding unterminated fragment at EOF");
    buf.clear();
    Ok(Line::Eof)
}

/// Consume bytes up to and including the next newline without storing them
async fn discard_rest_of_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut discarded = 0;
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(discarded);
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        discarded += consumed;
        if done {
            return Ok(discarded);
        }
    }
}

/// Forward every scan on `reader` until EOF or shutdown.
///
/// Errors are returned only when the dispatcher is gone; I/O errors from the
/// reader are passed up so the caller can reopen the device.
pub async fn read_scans<R>(
    channel: &str,
    mut reader: R,
    events: &EventSender,
    shutdown: &mut ShutdownListener,
) -> Result<ReadEnd>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(64);
    loop {
        let read = tokio::select! {
            _ = shutdown.wait() => return Ok(ReadEnd::Shutdown),
            read = next_line(&mut reader, &mut buf) => read?,
        };
        match read {
            Line::Eof => return Ok(ReadEnd::Eof),
            Line::Oversized => {
                warn!(channel, "Oversized line discarded");
                continue;
            }
            Line::Complete => {}
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(channel, error = %e, "Undecodable line discarded");
                continue;
            }
        };

        match parse_scan_line(line) {
            Some(tag) => {
                debug!(channel, tag = %tag, "Scan");
                events.send(GameEvent::scan(channel, tag)).await?;
            }
            None if line.trim().is_empty() => {}
            None => debug!(channel, line = line.trim(), "Ignoring line"),
        }
    }
}

/// Write queued display lines to the reader until the queue closes
async fn pump_display<W>(channel: &str, rx: Option<&mut mpsc::Receiver<String>>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    while let Some(line) = rx.recv().await {
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(channel, error = %e, "Display write failed");
        }
    }
    std::future::pending().await
}

/// One physical reader: scan lines in, display lines out
pub struct ChannelIngestor {
    config: ChannelConfig,
    events: EventSender,
    display_rx: Option<mpsc::Receiver<String>>,
}

impl ChannelIngestor {
    pub fn new(
        config: ChannelConfig,
        events: EventSender,
        display_rx: Option<mpsc::Receiver<String>>,
    ) -> Self {
        Self {
            config,
            events,
            display_rx,
        }
    }

    /// Read the device until shutdown, reopening it after EOF or errors
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        let name = self.config.name.clone();
        info!(channel = %name, device = %self.config.device.display(), "Ingestor started");

        loop {
            if shutdown.is_triggered() {
                break;
            }
            match self.read_device(&mut shutdown).await {
                Ok(ReadEnd::Shutdown) => break,
                Ok(ReadEnd::Eof) => info!(channel = %name, "Device closed, reopening"),
                Err(crate::error::TagTradeError::Channel(e)) => {
                    error!(channel = %name, error = %e, "Dispatcher gone, stopping ingestor");
                    break;
                }
                Err(e) => warn!(channel = %name, error = %e, "Reader error"),
            }

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }
        }
        info!(channel = %name, "Ingestor stopped");
    }

    async fn read_device(&mut self, shutdown: &mut ShutdownListener) -> Result<ReadEnd> {
        let device = self.config.device.clone();
        let reader = open_read(&device).await?;
        let writer = match open_write(&device).await {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(channel = %self.config.name, error = %e, "Display output unavailable");
                None
            }
        };

        let channel = self.config.name.as_str();
        let display_rx = match writer {
            Some(_) => self.display_rx.as_mut(),
            None => None,
        };
        let pump = async {
            match writer {
                Some(w) => pump_display(channel, display_rx, w).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            end = read_scans(channel, BufReader::new(reader), &self.events, shutdown) => end,
            _ = pump => Ok(ReadEnd::Eof),
        }
    }
}

async fn open_read(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new().read(true).open(path).await
}

async fn open_write(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new().write(true).open(path).await
}
