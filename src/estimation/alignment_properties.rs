// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::Result;
use log::info;

use crate::errors::Error;
use crate::records::flags;
use crate::records::stream::RecordStream;

/// Records inspected before the estimate is considered settled.
const PRELUDE_RECORDS: usize = 200_000;
/// Give up on inferring a read length after this many records.
const MAX_SCANNED: u64 = 20_000_000;
/// Usable insert sizes required before the estimate replaces the default.
const MIN_INSERTS: usize = 100;

/// Sequencing-library properties estimated from the leading records of the
/// stream: read length and the insert-size distribution used to scale all
/// pairing distances.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentProperties {
    pub read_length: u32,
    pub insert_median: f64,
    pub insert_stdev: f64,
    /// Whether records carry the `ZP` extended tags.
    pub extended_tags: bool,
}

impl AlignmentProperties {
    /// Scan up to 200 000 leading records, then rewind the stream if it
    /// supports that. Insert sizes are taken from proper-pair primary
    /// records with non-negative template length; an upper-MAD trim removes
    /// outliers before mean and standard deviation are computed.
    pub fn estimate<S: RecordStream>(stream: &mut S) -> Result<Self> {
        let mut read_lengths = Vec::new();
        let mut inserts = Vec::new();
        let mut extended_tags = false;
        let mut scanned: u64 = 0;

        while let Some((rec, _)) = stream.next_record()? {
            scanned += 1;
            if scanned > MAX_SCANNED {
                break;
            }
            if rec.extended {
                extended_tags = true;
            }
            if rec.flag & flags::SKIP != 0 || rec.cigar.is_empty() {
                continue;
            }
            if rec.is_primary() {
                let len = rec.infer_read_length();
                if len > 0 {
                    read_lengths.push(len);
                }
            }
            if rec.is_paired()
                && rec.is_proper_pair()
                && rec.flag & flags::INSERT_UNUSABLE == 0
                && rec.is_primary()
                && rec.tlen >= 0
            {
                inserts.push(rec.tlen as f64);
            }
            if inserts.len() >= PRELUDE_RECORDS {
                break;
            }
        }

        if scanned == 0 {
            return Err(Error::NoReads.into());
        }
        if read_lengths.is_empty() {
            return Err(Error::CannotInferReadLength { n_scanned: scanned }.into());
        }

        read_lengths.sort_unstable();
        let read_length = read_lengths[read_lengths.len() / 2];

        let (insert_median, insert_stdev) = if inserts.len() < MIN_INSERTS {
            (300.0, 150.0)
        } else {
            trimmed_insert_stats(&mut inserts)
        };

        info!(
            "estimated read length {}, insert size {:.1} +/- {:.1} from {} records",
            read_length, insert_median, insert_stdev, scanned
        );

        stream.rewind()?;

        Ok(AlignmentProperties {
            read_length,
            insert_median,
            insert_stdev,
            extended_tags,
        })
    }

    /// Breakpoint pairing distance.
    pub fn max_dist(&self, paired_end: bool) -> i64 {
        if paired_end {
            (self.insert_median + 5.0 * self.insert_stdev).round() as i64
        } else {
            i64::from(self.read_length) * 2
        }
    }

    /// Scope eviction distance.
    pub fn clst_dist(&self, paired_end: bool) -> i64 {
        self.max_dist(paired_end) * 2
    }
}

fn median(sorted: &[f64]) -> f64 {
    sorted[sorted.len() / 2]
}

/// Drop everything at or above `median + 8 * upper-MAD`, then return mean and
/// standard deviation of the remainder.
fn trimmed_insert_stats(inserts: &mut Vec<f64>) -> (f64, f64) {
    inserts.sort_unstable_by(f64::total_cmp);
    let med = median(inserts);
    let mut upper_devs: Vec<f64> = inserts.iter().filter(|&&x| x > med).map(|x| x - med).collect();
    let cutoff = if upper_devs.is_empty() {
        f64::MAX
    } else {
        upper_devs.sort_unstable_by(f64::total_cmp);
        med + 8.0 * median(&upper_devs)
    };
    let kept: Vec<f64> = inserts.iter().copied().filter(|&x| x < cutoff).collect();
    if kept.is_empty() {
        return (300.0, 150.0);
    }
    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    let var = kept.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / kept.len() as f64;
    (mean, var.sqrt())
}
