//! Notification adapter writing one JSON object per fired event.

use crate::domain::error::AlertEngineError;
use crate::domain::trigger_manager::FiredEvent;
use crate::ports::notification_port::NotificationPort;
use std::io::Write;

pub struct JsonLinesNotifier<W: Write> {
    writer: W,
    dispatched: usize,
}

impl<W: Write> JsonLinesNotifier<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            dispatched: 0,
        }
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> NotificationPort for JsonLinesNotifier<W> {
    fn dispatch(&mut self, event: &FiredEvent) -> Result<(), AlertEngineError> {
        let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        self.dispatched += 1;
        Ok(())
    }
}
