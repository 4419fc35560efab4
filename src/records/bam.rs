// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::Path;
use std::str;

use anyhow::Result;
use rust_htslib::bam::record::{Aux, CigarString};
use rust_htslib::bam::{self, FetchDefinition, Read};

use crate::errors::Error;
use crate::records::stream::RecordStream;
use crate::records::Alignment;

fn decode(rec: &bam::Record) -> Alignment {
    let sa = match rec.aux(b"SA") {
        Ok(Aux::String(s)) => Some(s.to_owned()),
        _ => None,
    };
    let extended = rec.aux(b"ZP").is_ok();
    Alignment {
        qname: rec.qname().to_vec(),
        flag: rec.flags(),
        tid: rec.tid(),
        pos: rec.pos(),
        mtid: rec.mtid(),
        mpos: rec.mpos(),
        mapq: rec.mapq(),
        tlen: rec.insert_size(),
        cigar: CigarString(rec.cigar().iter().cloned().collect()),
        seq: rec.seq().as_bytes(),
        quals: rec.qual().to_vec(),
        sa,
        extended,
    }
}

fn lookup_name(header: &bam::HeaderView, tid: i32) -> Option<String> {
    if tid < 0 || tid as u32 >= header.target_count() {
        return None;
    }
    str::from_utf8(header.tid2name(tid as u32))
        .ok()
        .map(String::from)
}

/// Sequential BAM adapter. Supports `tell`/`seek` (bgzf virtual offsets) but
/// no region fetches.
pub struct BamStream {
    reader: bam::Reader,
    record: bam::Record,
    first_offset: i64,
}

impl BamStream {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = bam::Reader::from_path(path)?;
        // after from_path the cursor sits just past the header
        let first_offset = reader.tell();
        Ok(BamStream {
            reader,
            record: bam::Record::new(),
            first_offset,
        })
    }
}

impl RecordStream for BamStream {
    fn next_record(&mut self) -> Result<Option<(Alignment, u64)>> {
        let tell = self.reader.tell() as u64;
        match self.reader.read(&mut self.record) {
            Some(Ok(())) => Ok(Some((decode(&self.record), tell))),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    fn rewind(&mut self) -> Result<bool> {
        self.reader.seek(self.first_offset)?;
        Ok(true)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(offset as i64)?;
        Ok(())
    }

    fn fetch(&mut self, _tid: i32, _start: i64, _end: i64) -> Result<()> {
        Err(Error::RandomAccessUnsupported.into())
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn supports_fetch(&self) -> bool {
        false
    }

    fn n_references(&self) -> usize {
        self.reader.header().target_count() as usize
    }

    fn reference_name(&self, tid: i32) -> Option<String> {
        lookup_name(self.reader.header(), tid)
    }

    fn reference_length(&self, tid: i32) -> Option<u64> {
        if tid < 0 {
            return None;
        }
        self.reader.header().target_len(tid as u32)
    }

    fn reference_id(&self, name: &str) -> Option<i32> {
        self.reader.header().tid(name.as_bytes()).map(|t| t as i32)
    }
}

/// Indexed BAM adapter for region-restricted scanning. `tell` cursors are
/// not meaningful while iterating fetches, so they are reported as 0 and the
/// engine falls back to buffering reads.
pub struct IndexedBamStream {
    reader: bam::IndexedReader,
    record: bam::Record,
}

impl IndexedBamStream {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = bam::IndexedReader::from_path(path)?;
        reader.fetch(FetchDefinition::All)?;
        Ok(IndexedBamStream {
            reader,
            record: bam::Record::new(),
        })
    }
}

impl RecordStream for IndexedBamStream {
    fn next_record(&mut self) -> Result<Option<(Alignment, u64)>> {
        match self.reader.read(&mut self.record) {
            Some(Ok(())) => Ok(Some((decode(&self.record), 0))),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    fn rewind(&mut self) -> Result<bool> {
        self.reader.fetch(FetchDefinition::All)?;
        Ok(true)
    }

    fn seek(&mut self, _offset: u64) -> Result<()> {
        Err(Error::RandomAccessUnsupported.into())
    }

    fn fetch(&mut self, tid: i32, start: i64, end: i64) -> Result<()> {
        self.reader.fetch((tid, start.max(0), end.max(0)))?;
        Ok(())
    }

    fn supports_random_access(&self) -> bool {
        false
    }

    fn supports_fetch(&self) -> bool {
        true
    }

    fn n_references(&self) -> usize {
        self.reader.header().target_count() as usize
    }

    fn reference_name(&self, tid: i32) -> Option<String> {
        lookup_name(self.reader.header(), tid)
    }

    fn reference_length(&self, tid: i32) -> Option<u64> {
        if tid < 0 {
            return None;
        }
        self.reader.header().target_len(tid as u32)
    }

    fn reference_id(&self, name: &str) -> Option<i32> {
        self.reader.header().tid(name.as_bytes()).map(|t| t as i32)
    }
}
