//! In-memory source and sink adapters.
//!
//! `MemorySource` replays a fixed list of rows. `MemorySink` collects every
//! row it receives; the caller keeps a [`MemorySinkHandle`] to read them back
//! after the run, since the sink itself is moved onto a worker thread.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{RowSink, RowSource};
use crate::row::{Row, RowType};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct MemorySource {
    row_type: RowType,
    rows: Vec<Row>,
    position: usize,
}

impl MemorySource {
    pub fn new(row_type: RowType, rows: Vec<Row>) -> Self {
        Self {
            row_type,
            rows,
            position: 0,
        }
    }
}

impl RowSource for MemorySource {
    fn row_type(&self) -> RowType {
        self.row_type.clone()
    }

    fn open(&mut self) -> PipelineResult<()> {
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> PipelineResult<Option<Row>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }
}

#[derive(Debug, Default)]
struct SinkState {
    row_type: Option<RowType>,
    rows: Vec<Row>,
    closed: bool,
}

/// Read side of a [`MemorySink`].
#[derive(Debug, Clone, Default)]
pub struct MemorySinkHandle {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySinkHandle {
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rows received so far, in arrival order.
    pub fn rows(&self) -> Vec<Row> {
        self.lock().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Layout the sink was opened with.
    pub fn row_type(&self) -> Option<RowType> {
        self.lock().row_type.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

pub struct MemorySink {
    handle: MemorySinkHandle,
}

impl MemorySink {
    pub fn new() -> (Self, MemorySinkHandle) {
        let handle = MemorySinkHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// A sink writing into an existing handle.
    pub fn with_handle(handle: MemorySinkHandle) -> Self {
        Self { handle }
    }
}

impl RowSink for MemorySink {
    fn open(&mut self, row_type: &RowType) -> PipelineResult<()> {
        let mut state = self.handle.lock();
        state.row_type = Some(row_type.clone());
        state.rows.clear();
        state.closed = false;
        Ok(())
    }

    fn write(&mut self, row: &Row) -> PipelineResult<()> {
        self.handle.lock().rows.push(row.clone());
        Ok(())
    }

    fn close(&mut self) -> PipelineResult<()> {
        self.handle.lock().closed = true;
        Ok(())
    }
}
