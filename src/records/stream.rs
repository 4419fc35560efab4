// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::Result;

use crate::errors::Error;
use crate::records::Alignment;

/// Source of coordinate-sorted alignments. The on-disk container stays
/// opaque; the engine only relies on iteration, an opaque byte cursor
/// (`tell`) for later retrieval, and optionally region fetches.
pub trait RecordStream {
    /// Next record in the current iteration context together with its
    /// `tell` cursor (0 when the stream cannot provide one).
    fn next_record(&mut self) -> Result<Option<(Alignment, u64)>>;

    /// Restart iteration from the first record. Returns `false` when the
    /// stream cannot rewind (e.g. piped input).
    fn rewind(&mut self) -> Result<bool>;

    /// Position the stream on a cursor previously obtained from
    /// `next_record`.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Restrict subsequent `next_record` calls to records overlapping the
    /// given region.
    fn fetch(&mut self, tid: i32, start: i64, end: i64) -> Result<()>;

    /// Whether `tell`/`seek` return usable cursors.
    fn supports_random_access(&self) -> bool;

    /// Whether `fetch` is available.
    fn supports_fetch(&self) -> bool;

    fn n_references(&self) -> usize;

    fn reference_name(&self, tid: i32) -> Option<String>;

    fn reference_length(&self, tid: i32) -> Option<u64>;

    fn reference_id(&self, name: &str) -> Option<i32>;
}

/// In-memory stream over pre-decoded alignments. Useful for hosts that
/// produce records from a non-standard source, and for tests. The `tell`
/// cursor is the record index.
pub struct MemoryStream {
    references: Vec<(String, u64)>,
    records: Vec<Alignment>,
    cursor: usize,
    // (tid, start, end, next index) of an active fetch
    window: Option<(i32, i64, i64, usize)>,
}

impl MemoryStream {
    /// `references`: `(name, length)` per reference, indexed by tid.
    /// `records` must be coordinate sorted.
    pub fn new(references: Vec<(String, u64)>, records: Vec<Alignment>) -> Self {
        MemoryStream {
            references,
            records,
            cursor: 0,
            window: None,
        }
    }
}

impl RecordStream for MemoryStream {
    fn next_record(&mut self) -> Result<Option<(Alignment, u64)>> {
        if let Some((tid, start, end, mut idx)) = self.window.take() {
            while idx < self.records.len() {
                let rec = &self.records[idx];
                idx += 1;
                if rec.tid == tid && rec.pos < end && rec.reference_end() > start {
                    self.window = Some((tid, start, end, idx));
                    return Ok(Some((self.records[idx - 1].clone(), (idx - 1) as u64)));
                }
            }
            return Ok(None);
        }
        if self.cursor >= self.records.len() {
            return Ok(None);
        }
        let tell = self.cursor as u64;
        let rec = self.records[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((rec, tell)))
    }

    fn rewind(&mut self) -> Result<bool> {
        self.cursor = 0;
        self.window = None;
        Ok(true)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset as usize >= self.records.len() {
            return Err(Error::RandomAccessUnsupported.into());
        }
        self.cursor = offset as usize;
        self.window = None;
        Ok(())
    }

    fn fetch(&mut self, tid: i32, start: i64, end: i64) -> Result<()> {
        self.window = Some((tid, start, end, 0));
        Ok(())
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn supports_fetch(&self) -> bool {
        true
    }

    fn n_references(&self) -> usize {
        self.references.len()
    }

    fn reference_name(&self, tid: i32) -> Option<String> {
        self.references.get(tid as usize).map(|(n, _)| n.clone())
    }

    fn reference_length(&self, tid: i32) -> Option<u64> {
        self.references.get(tid as usize).map(|(_, l)| *l)
    }

    fn reference_id(&self, name: &str) -> Option<i32> {
        self.references
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| i as i32)
    }
}
