// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::clustering::graph::{NodeName, ReadGraph};
use crate::clustering::scope::{PairedEndScope, INSERTION_CHROM};
use crate::clustering::ReadType;
use crate::records::hash64;

/// Maximum distance between a read breakpoint and a site for
/// `find_nearest_site` to report it.
const NEAREST_DIST: i64 = 50;
/// Sites stay in the lookup window while within this distance of the
/// cursor.
const SCOPE_WINDOW: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvType {
    Deletion,
    Insertion,
    Duplication,
    Inversion,
    Breakend,
}

/// A user-supplied prior locus.
#[derive(Debug, Clone)]
pub struct SiteRecord {
    pub chrom: i32,
    pub start: i64,
    pub chrom2: i32,
    pub end: i64,
    pub svtype: SvType,
    pub svlen: i64,
}

/// Injects synthetic graph nodes at prior loci as the scan passes them, so
/// that reads near a known site attach to it through weight-0 edges.
/// Queues must be position ordered per chromosome.
pub struct SiteIndex {
    pending: HashMap<i32, VecDeque<SiteRecord>>,
    cluster_dist: i64,
    scope: BTreeMap<i64, u32>,
    scope_chrom: i32,
    info: HashMap<u32, SiteRecord>,
}

impl SiteIndex {
    pub fn new(sites: HashMap<i32, VecDeque<SiteRecord>>, cluster_dist: i64) -> Self {
        SiteIndex {
            pending: sites,
            cluster_dist,
            scope: BTreeMap::new(),
            scope_chrom: -1,
            info: HashMap::new(),
        }
    }

    /// Advance the site cursor to `pos`, creating nodes for every site that
    /// just came within `cluster_dist` and dropping passed-by sites.
    pub fn add_any_sites(
        &mut self,
        chrom: i32,
        pos: i64,
        graph: &mut ReadGraph,
        pe_scope: &mut PairedEndScope,
    ) {
        if chrom != self.scope_chrom {
            self.scope.clear();
            self.scope_chrom = chrom;
        }
        if let Some(queue) = self.pending.get_mut(&chrom) {
            while let Some(site) = queue.front() {
                if site.start < pos - self.cluster_dist {
                    queue.pop_front();
                    continue;
                }
                if (site.start - pos).abs() >= self.cluster_dist {
                    break;
                }
                let site = match queue.pop_front() {
                    Some(site) => site,
                    None => break,
                };
                let (kind, length, c2, p2) = match site.svtype {
                    SvType::Deletion => (
                        ReadType::Deletion,
                        (site.end - site.start).max(0) as u32,
                        site.chrom2,
                        site.end,
                    ),
                    SvType::Insertion => (
                        ReadType::Insertion,
                        site.svlen.max(0) as u32,
                        INSERTION_CHROM,
                        site.start + site.svlen.max(0),
                    ),
                    _ => (ReadType::Breakend, 0, site.chrom2, site.end),
                };
                let node = graph.add_node(NodeName {
                    hash: hash64(format!("site:{}:{}", site.chrom, site.start).as_bytes()),
                    flag: 0,
                    pos: site.start,
                    chrom: site.chrom,
                    tell: 0,
                    cigar_index: -1,
                    event_pos: site.start,
                });
                pe_scope.add_item(node, site.chrom, site.start, c2, p2, kind, length);
                self.scope.insert(site.start, node);
                self.info.insert(node, site);
            }
        }
        // trim the lookup window behind the cursor
        let cutoff = pos - SCOPE_WINDOW;
        if cutoff > 0 && !self.scope.is_empty() {
            let kept = self.scope.split_off(&cutoff);
            self.scope = kept;
        }
    }

    /// Site node within 50 bp of `pos` among the sites currently in the
    /// scope window.
    pub fn find_nearest_site(&self, chrom: i32, pos: i64) -> Option<u32> {
        if chrom != self.scope_chrom {
            return None;
        }
        self.scope
            .range(pos - SCOPE_WINDOW..pos + SCOPE_WINDOW)
            .map(|(&site_pos, &node)| ((site_pos - pos).abs(), node))
            .filter(|&(dist, _)| dist <= NEAREST_DIST)
            .min_by_key(|&(dist, _)| dist)
            .map(|(_, node)| node)
    }

    /// Site record behind a synthetic node.
    pub fn site(&self, node: u32) -> Option<&SiteRecord> {
        self.info.get(&node)
    }
}
