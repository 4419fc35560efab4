// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;

use crate::errors::Error;
use crate::records::stream::RecordStream;

/// Half-open interval on a reference.
pub type Interval = (i32, i64, i64);

/// Sort intervals and merge overlapping or touching ones.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_unstable();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for (tid, start, end) in intervals {
        match merged.last_mut() {
            Some((last_tid, _, last_end)) if *last_tid == tid && start <= *last_end => {
                if end > *last_end {
                    *last_end = end;
                }
            }
            _ => merged.push((tid, start, end)),
        }
    }
    merged
}

/// Membership index over a set of intervals, used for the region-of-interest
/// checks of the scanner.
pub struct RegionIndex {
    by_tid: HashMap<i32, Vec<(i64, i64)>>,
}

impl RegionIndex {
    pub fn new(intervals: Vec<Interval>) -> Self {
        let mut by_tid: HashMap<i32, Vec<(i64, i64)>> = HashMap::new();
        for (tid, start, end) in merge_intervals(intervals) {
            by_tid.entry(tid).or_default().push((start, end));
        }
        RegionIndex { by_tid }
    }

    pub fn contains(&self, tid: i32, pos: i64) -> bool {
        let intervals = match self.by_tid.get(&tid) {
            Some(iv) => iv,
            None => return false,
        };
        // first interval starting after pos; the one before it may cover pos
        let idx = intervals.partition_point(|&(start, _)| start <= pos);
        idx > 0 && intervals[idx - 1].1 > pos
    }
}

/// Read a region file: tab-separated `chrom  start  end` lines, `#` comment
/// lines ignored. Unknown chromosome names are fatal.
pub fn read_region_file<P: AsRef<Path>, S: RecordStream>(
    path: P,
    stream: &S,
) -> Result<Vec<Interval>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut intervals = Vec::new();
    for record in reader.records() {
        let record = record?;
        let chrom = match record.get(0) {
            Some(c) if !c.is_empty() => c,
            _ => continue,
        };
        let tid = stream.reference_id(chrom).ok_or_else(|| Error::UnknownReferenceName {
            name: chrom.to_owned(),
        })?;
        let start: i64 = record.get(1).unwrap_or("").trim().parse()?;
        let end: i64 = record.get(2).unwrap_or("").trim().parse()?;
        intervals.push((tid, start, end));
    }
    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::records::stream::MemoryStream;

    #[test]
    fn test_merge_intervals() {
        let merged = merge_intervals(vec![(0, 500, 900), (0, 100, 600), (1, 100, 200)]);
        assert_eq!(merged, vec![(0, 100, 900), (1, 100, 200)]);
    }

    #[test]
    fn test_contains() {
        let index = RegionIndex::new(vec![(0, 100, 200), (0, 500, 600)]);
        assert!(index.contains(0, 100));
        assert!(index.contains(0, 199));
        assert!(!index.contains(0, 200));
        assert!(!index.contains(0, 400));
        assert!(index.contains(0, 550));
        assert!(!index.contains(1, 150));
    }

    #[test]
    fn test_read_region_file() {
        let stream = MemoryStream::new(
            vec![("chr1".to_owned(), 10_000), ("chr2".to_owned(), 10_000)],
            vec![],
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "chr1\t100\t200").unwrap();
        writeln!(file, "chr2\t5\t50").unwrap();
        let intervals = read_region_file(file.path(), &stream).unwrap();
        assert_eq!(intervals, vec![(0, 100, 200), (1, 5, 50)]);
    }

    #[test]
    fn test_unknown_reference_is_fatal() {
        let stream = MemoryStream::new(vec![("chr1".to_owned(), 10_000)], vec![]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chrMissing\t1\t2").unwrap();
        let err = read_region_file(file.path(), &stream).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnknownReferenceName { .. })
        ));
    }
}
