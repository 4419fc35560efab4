// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::records::{hash64, Alignment};

/// Candidate partners reported per scope update.
const MAX_PARTNERS: usize = 5;
/// Positional slack under which a posting-list hit earns a target bonus.
const NEAR_HIT: i64 = 7;

/// Minimizers of `seq`: the minimum k-mer hash of every `w`-window, plus the
/// two boundary k-mers, which are always emitted. Hashes are xxHash64 with
/// the fixed seed so results stay comparable across runs.
pub fn minimizers(seq: &[u8], k: usize, w: usize) -> HashSet<u64> {
    let mut out = HashSet::new();
    if seq.is_empty() {
        return out;
    }
    if seq.len() <= k {
        out.insert(hash64(seq));
        return out;
    }
    let hashes: Vec<u64> = seq.windows(k).map(hash64).collect();
    out.insert(hashes[0]);
    out.insert(hashes[hashes.len() - 1]);
    if hashes.len() <= w {
        if let Some(&min) = hashes.iter().min() {
            out.insert(min);
        }
        return out;
    }
    for window in hashes.windows(w) {
        if let Some(&min) = window.iter().min() {
            out.insert(min);
        }
    }
    out
}

struct ClipSide {
    // (position, node, its minimizers), oldest first
    scope: VecDeque<(i64, u32, Vec<u64>)>,
    postings: HashMap<u64, Vec<(i64, u32)>>,
}

impl ClipSide {
    fn new() -> Self {
        ClipSide {
            scope: VecDeque::new(),
            postings: HashMap::new(),
        }
    }

    fn clear(&mut self) {
        self.scope.clear();
        self.postings.clear();
    }

    fn evict(&mut self, pos: i64, max_dist: i64) {
        loop {
            match self.scope.front() {
                Some(&(q, _, _)) if (q - pos).abs() > max_dist => {}
                _ => break,
            }
            if let Some((q, node, mins)) = self.scope.pop_front() {
                for m in mins {
                    if let Some(list) = self.postings.get_mut(&m) {
                        list.retain(|&(p, n)| !(p == q && n == node));
                        if list.is_empty() {
                            self.postings.remove(&m);
                        }
                    }
                }
            }
        }
    }
}

/// Minimizer index over soft-clip sequences, one side per clip orientation.
/// Groups reads whose clips share enough minimizers inside a local window —
/// the linking of last resort when breakpoint coordinates alone cannot
/// relate reads.
pub struct ClipScope {
    k: usize,
    w: usize,
    clip_length: u32,
    max_dist: i64,
    support_thresh: u32,
    read_length: u32,
    current_chrom: i32,
    sides: [ClipSide; 2],
}

impl ClipScope {
    pub fn new(
        k: usize,
        w: usize,
        clip_length: u32,
        max_dist: i64,
        support_thresh: u32,
        read_length: u32,
    ) -> Self {
        ClipScope {
            k,
            w,
            clip_length,
            max_dist,
            support_thresh,
            read_length,
            current_chrom: -1,
            sides: [ClipSide::new(), ClipSide::new()],
        }
    }

    /// Index the record's qualifying clips at `pos` and append clustered
    /// partner nodes (at most 5) to `out`.
    pub fn update(&mut self, rec: &Alignment, node: u32, chrom: i32, pos: i64, out: &mut Vec<u32>) {
        if chrom != self.current_chrom {
            for side in &mut self.sides {
                side.clear();
            }
            self.current_chrom = chrom;
        }
        let clips = [rec.left_clip_seq(), rec.right_clip_seq()];
        for (side_idx, clip) in clips.iter().enumerate() {
            if (clip.len() as u32) < self.clip_length {
                continue;
            }
            let k = self.k;
            let w = self.w;
            let side = &mut self.sides[side_idx];
            side.evict(pos, self.max_dist);
            let mins = minimizers(clip, k, w);

            // a glut of distinct minimizers in scope means repetitive
            // sequence; index the clip but do not report partners
            let limit = (1.0 + 0.15 * side.scope.len() as f32)
                * self.read_length as f32
                * 2.0
                / (w as f32 + 1.0);
            let searchable = (side.postings.len() as f32) <= limit;

            if searchable {
                let mut total_matches = 0u32;
                let mut target_counter: HashMap<u32, u32> = HashMap::new();
                for m in &mins {
                    if let Some(list) = side.postings.get(m) {
                        for &(q, n) in list {
                            if n == node {
                                continue;
                            }
                            total_matches += 1;
                            if (q - pos).abs() < NEAR_HIT {
                                *target_counter.entry(n).or_insert(0) += 1;
                            }
                            let support =
                                total_matches / 2 + target_counter.get(&n).copied().unwrap_or(0);
                            if support >= self.support_thresh
                                && out.len() < MAX_PARTNERS
                                && !out.contains(&n)
                            {
                                out.push(n);
                            }
                        }
                    }
                }
            }

            for m in &mins {
                side.postings.entry(*m).or_default().push((pos, node));
            }
            side.scope.push_back((pos, node, mins.into_iter().collect()));
        }
    }
}
