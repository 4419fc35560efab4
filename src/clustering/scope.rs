// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use crate::clustering::ReadType;

/// Sentinel partner chromosome for insertion events, which have no real
/// second locus.
pub const INSERTION_CHROM: i32 = 10_000_000;

/// Breakpoint separation below which two events are compared by span alone.
const EXACT_SEP: i64 = 35;
/// Maximum span ratio difference accepted in the exact bucket.
const EXACT_SPAN_RATIO: f32 = 0.8;
/// Ordered-map steps walked in each direction from the query position.
const WALK_STEPS: usize = 6;

#[derive(Debug, Clone, Copy)]
struct ScopeItem {
    pos2: i64,
    node: u32,
    kind: ReadType,
    len_cigar: u32,
}

/// Do two intervals each cover at least half of the other? Point events
/// carry no span information and pass trivially.
fn is_reciprocal_overlapping(x1: i64, x2: i64, y1: i64, y2: i64) -> bool {
    let (x_lo, x_hi) = (x1.min(x2), x1.max(x2));
    let (y_lo, y_hi) = (y1.min(y2), y1.max(y2));
    if x_lo == x_hi || y_lo == y_hi {
        return true;
    }
    let overlap = (x_hi.min(y_hi) - x_lo.max(y_lo)).max(0);
    overlap * 2 >= x_hi - x_lo && overlap * 2 >= y_hi - y_lo
}

/// Normalized distance between two breakpoint pairs: positional offset of
/// the event centers scaled by `norm`, plus the span-length mismatch ratio.
/// Insertion spans come from CIGAR lengths when `trust_ins_len` is set; for
/// between-read signals under paired-end sequencing the positional norm is
/// relaxed to absorb insert-size spread.
#[allow(clippy::too_many_arguments)]
fn span_position_distance(
    p1: i64,
    p2: i64,
    q1: i64,
    q2: i64,
    kind: ReadType,
    len1: u32,
    len2: u32,
    norm: f32,
    thresh: f32,
    paired_end: bool,
    trust_ins_len: bool,
) -> bool {
    let (span1, span2, center1, center2) =
        if kind == ReadType::Insertion && trust_ins_len && len1 > 0 && len2 > 0 {
            (len1 as f32, len2 as f32, p1 as f32, q1 as f32)
        } else {
            (
                (p2 - p1).abs() as f32,
                (q2 - q1).abs() as f32,
                (p1 + p2) as f32 / 2.0,
                (q1 + q2) as f32 / 2.0,
            )
        };
    let max_span = span1.max(span2);
    let span_distance = if max_span > 0.0 {
        (span1 - span2).abs() / max_span
    } else {
        0.0
    };
    let norm = if paired_end && (kind as u8) < 2 {
        norm * 2.0
    } else {
        norm
    };
    let position_distance = (center1 - center2).abs();
    position_distance / norm + span_distance < thresh
}

/// Sliding per-chromosome scope of recently seen breakpoint pairs. For a new
/// event `(c1:p1) -> (c2:p2)` it answers which prior nodes are close enough
/// on both sides to witness the same SV.
///
/// `loci` tracks the local (p1) breaks of the current chromosome and is
/// evicted behind the cursor; `chrom_scope` holds one ordered map of partner
/// (p2) breaks per reference, plus the insertion sentinel slot, and is the
/// side that gets searched. Deletions additionally key their local break
/// into the partner scope so their start stays findable near their end.
pub struct PairedEndScope {
    max_dist: i64,
    clst_dist: i64,
    norm: f32,
    thresh: f32,
    paired_end: bool,
    local_chrom: i32,
    loci: BTreeMap<i64, Vec<ScopeItem>>,
    chrom_scope: Vec<BTreeMap<i64, Vec<ScopeItem>>>,
}

impl PairedEndScope {
    pub fn new(
        max_dist: i64,
        clst_dist: i64,
        n_references: usize,
        norm: f32,
        thresh: f32,
        paired_end: bool,
    ) -> Self {
        PairedEndScope {
            max_dist,
            clst_dist,
            norm,
            thresh,
            paired_end,
            local_chrom: -1,
            loci: BTreeMap::new(),
            chrom_scope: (0..=n_references).map(|_| BTreeMap::new()).collect(),
        }
    }

    fn slot(&self, chrom: i32) -> usize {
        if chrom == INSERTION_CHROM {
            self.chrom_scope.len() - 1
        } else {
            chrom as usize
        }
    }

    pub fn clear(&mut self) {
        self.loci.clear();
        for scope in &mut self.chrom_scope {
            scope.clear();
        }
    }

    /// All scopes must be empty before positions from a new chromosome are
    /// inserted.
    pub fn is_empty(&self) -> bool {
        self.loci.is_empty() && self.chrom_scope.iter().all(|s| s.is_empty())
    }

    fn switch_chrom(&mut self, chrom: i32) {
        if chrom != self.local_chrom {
            self.clear();
            self.local_chrom = chrom;
        }
    }

    /// Record the breakpoint pair of a new node.
    #[allow(clippy::too_many_arguments)]
    pub fn add_item(
        &mut self,
        node: u32,
        c1: i32,
        p1: i64,
        c2: i32,
        p2: i64,
        kind: ReadType,
        len_cigar: u32,
    ) {
        self.switch_chrom(c1);
        let local = ScopeItem {
            pos2: p2,
            node,
            kind,
            len_cigar,
        };
        self.loci.entry(p1).or_default().push(local);
        let forward = self.slot(c2);
        if kind == ReadType::Deletion {
            // keep the deletion's start findable near its end
            self.chrom_scope[forward].entry(p1).or_default().push(local);
        }
        self.chrom_scope[forward].entry(p2).or_default().push(ScopeItem {
            pos2: p1,
            node,
            kind,
            len_cigar,
        });
    }

    /// Prior nodes whose breakpoint pairs are reciprocally close to
    /// `(c1:p1) -> (c2:p2)`. Exact-bucket partners (separation < 35 bp with
    /// compatible spans) shadow distance-bucket partners.
    #[allow(clippy::too_many_arguments)]
    pub fn find_other_nodes(
        &mut self,
        node: u32,
        c1: i32,
        p1: i64,
        c2: i32,
        p2: i64,
        kind: ReadType,
        len_cigar: u32,
        trust_ins_len: bool,
    ) -> Vec<u32> {
        self.switch_chrom(c1);
        if self.loci.is_empty() {
            return Vec::new();
        }
        // evict stale local breaks
        let cutoff = p1 - self.clst_dist;
        if cutoff > 0 {
            let kept = self.loci.split_off(&cutoff);
            self.loci = kept;
        }

        let mut found_exact = Vec::new();
        let mut found_near = Vec::new();
        let scope = &self.chrom_scope[self.slot(c2)];
        let forward = scope.range(p2..).take(WALK_STEPS);
        let backward = scope.range(..p2).rev().take(WALK_STEPS);
        for (&key, items) in forward.chain(backward) {
            if (key - p2).abs() >= self.max_dist {
                continue;
            }
            for item in items {
                self.check_candidate(
                    node,
                    c1,
                    p1,
                    c2,
                    p2,
                    kind,
                    len_cigar,
                    trust_ins_len,
                    key,
                    item,
                    &mut found_exact,
                    &mut found_near,
                );
            }
        }
        if !found_exact.is_empty() {
            found_exact
        } else {
            found_near
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_candidate(
        &self,
        node: u32,
        c1: i32,
        p1: i64,
        c2: i32,
        p2: i64,
        kind: ReadType,
        len_cigar: u32,
        trust_ins_len: bool,
        key: i64,
        item: &ScopeItem,
        found_exact: &mut Vec<u32>,
        found_near: &mut Vec<u32>,
    ) {
        if item.node == node {
            return;
        }
        // deletions and insertions never partner each other
        if (kind == ReadType::Deletion && item.kind == ReadType::Insertion)
            || (kind == ReadType::Insertion && item.kind == ReadType::Deletion)
        {
            return;
        }
        let sep = (key - p2).abs();
        if c1 != c2 || is_reciprocal_overlapping(p1, p2, key, item.pos2) {
            if sep < EXACT_SEP {
                if len_cigar > 0 && item.len_cigar > 0 {
                    let max_span = len_cigar.max(item.len_cigar) as f32;
                    let span_distance =
                        (len_cigar as f32 - item.len_cigar as f32).abs() / max_span;
                    if span_distance < EXACT_SPAN_RATIO {
                        found_exact.push(item.node);
                    }
                } else {
                    found_exact.push(item.node);
                }
            } else {
                let sep2 = (item.pos2 - p1).abs();
                if sep < self.max_dist
                    && sep2 < self.max_dist
                    && span_position_distance(
                        p1,
                        p2,
                        key,
                        item.pos2,
                        kind,
                        len_cigar,
                        item.len_cigar,
                        self.norm,
                        self.thresh,
                        self.paired_end,
                        trust_ins_len,
                    )
                {
                    found_near.push(item.node);
                }
            }
        } else if span_position_distance(
            p1,
            p2,
            key,
            item.pos2,
            kind,
            len_cigar,
            item.len_cigar,
            self.norm,
            self.thresh,
            self.paired_end,
            trust_ins_len,
        ) {
            found_near.push(item.node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> PairedEndScope {
        // max_dist 500, clst_dist 1000, norm 100, thresh 0.3
        PairedEndScope::new(500, 1000, 3, 100.0, 0.3, true)
    }

    #[test]
    fn test_exact_bucket_split_partners() {
        let mut s = scope();
        // split read chr0:1000 -> chr1:9000, then a second at 1005 -> 9003
        s.add_item(0, 0, 1000, 1, 9000, ReadType::Split, 0);
        let found = s.find_other_nodes(1, 0, 1005, 1, 9003, ReadType::Split, 0, true);
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_deletion_links_via_exact_bucket() {
        let mut s = scope();
        s.add_item(0, 0, 10_000, 0, 11_000, ReadType::Deletion, 1000);
        let found =
            s.find_other_nodes(1, 0, 10_003, 0, 11_002, ReadType::Deletion, 999, true);
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_deletion_start_stays_findable() {
        let mut s = scope();
        s.add_item(0, 0, 10_000, 0, 11_000, ReadType::Deletion, 1000);
        // a breakend right at the deletion start partners through the extra
        // local-break entry
        let found =
            s.find_other_nodes(1, 0, 10_004, 0, 10_004, ReadType::Breakend, 0, true);
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_exact_bucket_rejects_disparate_spans() {
        let mut s = scope();
        s.add_item(0, 0, 10_000, 0, 11_000, ReadType::Deletion, 1000);
        // same end coordinate but a 40 bp event: span ratio 0.96
        let found = s.find_other_nodes(1, 0, 10_970, 0, 11_010, ReadType::Deletion, 40, true);
        assert!(found.is_empty());
    }

    #[test]
    fn test_discordant_pairs_link_across_templates() {
        let mut s = scope();
        // two distinct templates both witnessing chr0:~1100 -> ~5000
        s.add_item(0, 0, 1100, 0, 5000, ReadType::Discordant, 0);
        let found = s.find_other_nodes(1, 0, 1105, 0, 5003, ReadType::Discordant, 0, true);
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_reverse_side_mates_link_despite_eviction() {
        let mut s = scope();
        // forward mates around 1100, reverse mates arriving at 5000+
        s.add_item(0, 0, 1100, 0, 5000, ReadType::Discordant, 0);
        s.add_item(1, 0, 1110, 0, 5010, ReadType::Discordant, 0);
        s.add_item(2, 0, 5000, 0, 1000, ReadType::Discordant, 0);
        let found = s.find_other_nodes(3, 0, 5010, 0, 1010, ReadType::Discordant, 0, true);
        assert_eq!(found, vec![2]);
    }

    #[test]
    fn test_deletion_and_insertion_never_pair() {
        let mut s = scope();
        // an insertion keyed into the positional scope must not partner a
        // deletion at the same spot
        s.add_item(0, 0, 10_000, 0, 10_050, ReadType::Insertion, 50);
        let found =
            s.find_other_nodes(1, 0, 10_000, 0, 10_050, ReadType::Deletion, 50, true);
        assert!(found.is_empty());
    }

    #[test]
    fn test_insertions_pair_in_sentinel_scope() {
        let mut s = scope();
        s.add_item(0, 0, 10_000, INSERTION_CHROM, 10_050, ReadType::Insertion, 50);
        let found = s.find_other_nodes(
            1,
            0,
            10_004,
            INSERTION_CHROM,
            10_052,
            ReadType::Insertion,
            48,
            true,
        );
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_chromosome_change_clears_scopes() {
        let mut s = scope();
        s.add_item(0, 0, 1000, 0, 2000, ReadType::Deletion, 1000);
        assert!(!s.is_empty());
        let found = s.find_other_nodes(1, 1, 1000, 1, 2000, ReadType::Deletion, 1000, true);
        assert!(found.is_empty());
        assert!(s.is_empty());
    }

    #[test]
    fn test_far_candidates_out_of_reach() {
        let mut s = scope();
        s.add_item(0, 0, 1000, 0, 5000, ReadType::Discordant, 0);
        // query 600 bp away from every stored key with max_dist 500
        let found = s.find_other_nodes(1, 0, 1600, 0, 5600, ReadType::Discordant, 0, true);
        assert!(found.is_empty());
    }
}
