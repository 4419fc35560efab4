// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{HashSet, VecDeque};

use anyhow::Result;
use log::debug;

use crate::records::stream::RecordStream;
use crate::records::{flags, Alignment};

pub mod coverage;
pub mod regions;

use self::coverage::{CoverageTracker, BIN_SIZE};
use self::regions::{merge_intervals, Interval, RegionIndex};

/// Window added around mate and SA partner positions in region-restricted
/// mode.
const PARTNER_PAD: i64 = 1_000;

/// Single-pass streaming reader. Groups admitted records into 100-bp bins,
/// suppresses bins whose depth reaches `max_cov` outside regions of
/// interest, and yields ordered batches of `(alignment, tell)` pairs.
///
/// In region-restricted mode the scanner first walks the user intervals to
/// discover mate-pair and split-partner regions, merges everything, then
/// fetches each merged interval and feeds records through the same binning
/// pipeline, deduplicating on `(qname_hash, flag, pos)`.
pub struct GenomeScanner {
    max_cov: f32,
    clip_length: u32,
    coverage: CoverageTracker,
    roi: Option<RegionIndex>,
    user_intervals: Vec<Interval>,
    pending: VecDeque<Interval>,
    seen: HashSet<(u64, u16, i64)>,
    staged: VecDeque<Vec<(Alignment, u64)>>,
    current_bin: Vec<(Alignment, u64)>,
    current_tid: i32,
    current_bin_idx: i64,
    region_mode: bool,
    regions_discovered: bool,
    fetch_active: bool,
    pub reads_dropped: u64,
}

impl GenomeScanner {
    pub fn new(max_cov: u32, clip_length: u32, reference_lengths: &[u64]) -> Self {
        GenomeScanner {
            max_cov: max_cov as f32,
            clip_length,
            coverage: CoverageTracker::new(reference_lengths),
            roi: None,
            user_intervals: Vec::new(),
            pending: VecDeque::new(),
            seen: HashSet::new(),
            staged: VecDeque::new(),
            current_bin: Vec::new(),
            current_tid: -1,
            current_bin_idx: -1,
            region_mode: false,
            regions_discovered: false,
            fetch_active: false,
            reads_dropped: 0,
        }
    }

    /// Region-restricted scanner over the given user intervals.
    pub fn with_regions(
        max_cov: u32,
        clip_length: u32,
        reference_lengths: &[u64],
        intervals: Vec<Interval>,
    ) -> Self {
        let mut scanner = Self::new(max_cov, clip_length, reference_lengths);
        scanner.roi = Some(RegionIndex::new(intervals.clone()));
        scanner.user_intervals = merge_intervals(intervals);
        scanner.region_mode = true;
        scanner
    }

    /// Next ordered batch, or `None` at end of scan. Batches must be
    /// consumed in emission order.
    pub fn next_batch<S: RecordStream>(
        &mut self,
        stream: &mut S,
    ) -> Result<Option<Vec<(Alignment, u64)>>> {
        if self.region_mode {
            self.next_batch_regions(stream)
        } else {
            self.next_batch_linear(stream)
        }
    }

    fn next_batch_linear<S: RecordStream>(
        &mut self,
        stream: &mut S,
    ) -> Result<Option<Vec<(Alignment, u64)>>> {
        loop {
            if let Some(batch) = self.staged.pop_front() {
                return Ok(Some(batch));
            }
            match stream.next_record()? {
                Some((rec, tell)) => self.add_to_bin_buffer(rec, tell),
                None => {
                    self.finalize_bin();
                    return Ok(self.staged.pop_front());
                }
            }
        }
    }

    fn next_batch_regions<S: RecordStream>(
        &mut self,
        stream: &mut S,
    ) -> Result<Option<Vec<(Alignment, u64)>>> {
        if !self.regions_discovered {
            self.discover_regions(stream)?;
            self.regions_discovered = true;
        }
        loop {
            if let Some(batch) = self.staged.pop_front() {
                return Ok(Some(batch));
            }
            if self.fetch_active {
                match stream.next_record()? {
                    Some((rec, tell)) => {
                        let key = (rec.qname_hash(), rec.flag, rec.pos);
                        if self.seen.insert(key) {
                            self.add_to_bin_buffer(rec, tell);
                        }
                    }
                    None => self.fetch_active = false,
                }
            } else if let Some((tid, start, end)) = self.pending.pop_front() {
                stream.fetch(tid, start, end)?;
                self.fetch_active = true;
            } else {
                self.finalize_bin();
                return Ok(self.staged.pop_front());
            }
        }
    }

    /// Walk the user intervals once and widen the scan with a window around
    /// every informative record's mate and SA pointers.
    fn discover_regions<S: RecordStream>(&mut self, stream: &mut S) -> Result<()> {
        let mut intervals = self.user_intervals.clone();
        for &(tid, start, end) in &self.user_intervals {
            stream.fetch(tid, start, end)?;
            while let Some((rec, _)) = stream.next_record()? {
                if rec.flag & flags::SKIP != 0 || !self.is_informative(&rec) {
                    continue;
                }
                if rec.is_paired() && !rec.is_mate_unmapped() && rec.mtid >= 0 {
                    intervals.push((
                        rec.mtid,
                        (rec.mpos - PARTNER_PAD).max(0),
                        rec.mpos + PARTNER_PAD,
                    ));
                }
                for entry in rec.sa_entries() {
                    if let Some(sa_tid) = stream.reference_id(&entry.rname) {
                        intervals.push((
                            sa_tid,
                            (entry.pos - PARTNER_PAD).max(0),
                            entry.pos + PARTNER_PAD,
                        ));
                    }
                }
            }
        }
        let merged = merge_intervals(intervals);
        debug!("region scan over {} merged intervals", merged.len());
        self.pending = merged.into();
        self.seen.clear();
        Ok(())
    }

    fn is_informative(&self, rec: &Alignment) -> bool {
        rec.sa.is_some()
            || (rec.is_paired() && (!rec.is_proper_pair() || rec.mtid != rec.tid))
            || rec.left_clip() >= self.clip_length
            || rec.right_clip() >= self.clip_length
    }

    fn in_roi(&self, tid: i32, pos: i64) -> bool {
        self.roi.as_ref().map_or(false, |r| r.contains(tid, pos))
    }

    fn add_to_bin_buffer(&mut self, rec: Alignment, tell: u64) {
        if rec.flag & flags::SKIP != 0 || rec.cigar.is_empty() || rec.seq.is_empty() {
            return;
        }
        let tid = rec.tid;
        let bin_idx = rec.pos / BIN_SIZE;
        if tid != self.current_tid || bin_idx != self.current_bin_idx {
            self.finalize_bin();
            self.current_tid = tid;
            self.current_bin_idx = bin_idx;
        }
        let depth = self.coverage.add(tid, rec.pos, rec.reference_end());
        if depth >= self.max_cov && !self.in_roi(tid, rec.pos) {
            let dropped = self.current_bin.len() as u64 + 1;
            self.reads_dropped += dropped;
            self.current_bin.clear();
            return;
        }
        self.current_bin.push((rec, tell));
    }

    fn finalize_bin(&mut self) {
        if self.current_bin.is_empty() {
            return;
        }
        let depth = self.coverage.depth(self.current_tid, self.current_bin_idx);
        let start = self.current_bin_idx * BIN_SIZE;
        if depth >= self.max_cov && !self.in_roi(self.current_tid, start) {
            self.reads_dropped += self.current_bin.len() as u64;
            self.current_bin.clear();
            return;
        }
        self.staged.push_back(std::mem::take(&mut self.current_bin));
    }

    pub fn coverage(&self) -> &CoverageTracker {
        &self.coverage
    }
}
