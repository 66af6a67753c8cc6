//! Pipe over a rectangular block store.

use std::sync::Arc;

use async_trait::async_trait;
use datapipe_core::binding::{Binding, SourceHandle};
use datapipe_core::pipe::stream_filtered;
use datapipe_core::{AddPipe, Expr, PipeError, QueryPipe, Record, RecordStream, Value};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::cell::Cell;
use super::grid::GridSheet;
use super::map::BlockMap;

/// Produces candidate block origins for a query.
pub trait BlockExtractor: Send + Sync {
    /// Origins of the blocks currently present in the store.
    fn blocks(&self, map: &BlockMap) -> Result<Vec<Box<dyn Cell>>, PipeError>;
}

/// Extractor that scans a [`GridSheet`] from a start cell, one block extent
/// at a time along the map's orientation, stopping at the first block whose
/// leading field cell is empty.
pub struct ScanExtractor {
    sheet: GridSheet,
    start_row: i64,
    start_col: i64,
}

impl ScanExtractor {
    #[must_use]
    pub fn new(sheet: GridSheet, start_row: i64, start_col: i64) -> Self {
        Self {
            sheet,
            start_row,
            start_col,
        }
    }
}

impl BlockExtractor for ScanExtractor {
    fn blocks(&self, map: &BlockMap) -> Result<Vec<Box<dyn Cell>>, PipeError> {
        let Some(probe) = map.fields().first() else {
            return Ok(Vec::new());
        };
        let (probe_row, probe_col) = probe.value_offset();
        let mut origin: Box<dyn Cell> = Box::new(self.sheet.cell(self.start_row, self.start_col));
        let mut origins = Vec::new();
        loop {
            if matches!(origin.offset(probe_row, probe_col).get()?, Value::Null) {
                return Ok(origins);
            }
            origins.push(origin.offset(0, 0));
            origin = map.advance(&*origin);
        }
    }
}

struct WriteState {
    origin: Box<dyn Cell>,
    titles_written: bool,
}

/// Read/write pipe over a block store.
///
/// Writes advance a cursor one block extent at a time; titles, when the map
/// configures any, are written once, before the first block. Binding is
/// supported: the handle is the block's origin address and write-back goes
/// through the mapped field cells.
pub struct BlockPipe {
    map: BlockMap,
    write: Mutex<WriteState>,
    extractor: Arc<dyn BlockExtractor>,
}

impl BlockPipe {
    /// A pipe writing from `first_block` onward and reading through
    /// `extractor`.
    #[must_use]
    pub fn new(map: BlockMap, first_block: Box<dyn Cell>, extractor: Arc<dyn BlockExtractor>) -> Self {
        Self {
            map,
            write: Mutex::new(WriteState {
                origin: first_block,
                titles_written: false,
            }),
            extractor,
        }
    }

    fn wire_binding(&self, origin: &dyn Cell, record: &Record) -> Result<(), PipeError> {
        let address = origin.address();
        let binding = Binding::new(SourceHandle::Block {
            row: address.row,
            col: address.col,
        });

        let cells = self.map.field_cells(origin);
        binding.subscribe_update(move |name, value| {
            let Some((_, cell)) = cells.iter().find(|(n, _)| n == name) else {
                return;
            };
            if let Err(e) = cell.set(value) {
                warn!(name, error = %e, "block write-back failed");
            }
        });

        let cells = self.map.field_cells(origin);
        binding.subscribe_delete(move || {
            for (name, cell) in &cells {
                if let Err(e) = cell.set(&Value::Null) {
                    warn!(name, error = %e, "block delete write-back failed");
                }
            }
        });

        record.bind(binding)
    }
}

#[async_trait]
impl QueryPipe for BlockPipe {
    fn can_binding(&self) -> bool {
        true
    }

    async fn query(
        &self,
        predicate: Option<&Expr>,
        want_binding: bool,
    ) -> Result<RecordStream, PipeError> {
        let origins = self.extractor.blocks(&self.map)?;
        let mut records = Vec::with_capacity(origins.len());
        for origin in origins {
            let record = self.map.read(&*origin)?;
            if want_binding {
                self.wire_binding(&*origin, &record)?;
            }
            records.push(record);
        }
        Ok(stream_filtered(records, predicate.cloned()))
    }
}

#[async_trait]
impl AddPipe for BlockPipe {
    fn can_binding(&self) -> bool {
        true
    }

    async fn add(&self, records: Vec<Record>, want_binding: bool) -> Result<(), PipeError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut state = self.write.lock();
        if !state.titles_written {
            if self.map.has_titles() {
                self.map.write_titles(&*state.origin)?;
            }
            state.titles_written = true;
        }
        let swept = state.origin.offset(0, 0);
        for record in &records {
            self.map.write(&*state.origin, record)?;
            if want_binding {
                self.wire_binding(&*state.origin, record)?;
            }
            state.origin = self.map.advance(&*state.origin);
        }
        // Cosmetic only: minimal backends may not implement it.
        if let Err(e) = swept.autofit() {
            debug!(error = %e, "block autofit unavailable");
        }
        Ok(())
    }
}
