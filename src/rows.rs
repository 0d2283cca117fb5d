//! Row set proxy.

use std::sync::Arc;

use crate::driver::Rows;
use crate::error::{Layer, Result};
use crate::hook::Operation;
use crate::instrument::Recording;
use crate::value::Value;

/// Counts rows as they are read and records the total when closed.
///
/// The response event is written on the first `close`. A row set that is
/// never closed leaves its query without a response in the trace.
pub struct RecordingRows {
    inner: Box<dyn Rows>,
    recording: Arc<Recording>,
    rows_found: u64,
    reported: bool,
}

impl RecordingRows {
    pub(crate) fn new(inner: Box<dyn Rows>, recording: Arc<Recording>) -> Self {
        Self {
            inner,
            recording,
            rows_found: 0,
            reported: false,
        }
    }

    /// Rows read so far.
    pub fn rows_found(&self) -> u64 {
        self.rows_found
    }
}

impl Rows for RecordingRows {
    fn columns(&self) -> Vec<String> {
        self.inner.columns()
    }

    fn next(&mut self, dest: &mut [Value]) -> Result<bool> {
        self.recording.intercept(Layer::Rows, Operation::Next, None);
        let more = self.recording.settle(Layer::Rows, Operation::Next, self.inner.next(dest))?;
        if more {
            self.rows_found += 1;
        }
        Ok(more)
    }

    fn close(&mut self) -> Result<()> {
        self.recording.intercept(Layer::Rows, Operation::Close, None);
        if !self.reported {
            self.reported = true;
            self.recording.rows_returned(self.rows_found);
        }
        self.recording
            .settle(Layer::Rows, Operation::Close, self.inner.close())
    }
}
