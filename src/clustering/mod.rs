// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;

use anyhow::Result;
use log::debug;
use rust_htslib::bam::record::Cigar;

use crate::errors::Error;
use crate::estimation::alignment_properties::AlignmentProperties;
use crate::options::Options;
use crate::records::stream::RecordStream;
use crate::records::{flags, Alignment};
use crate::scanning::regions::Interval;
use crate::scanning::GenomeScanner;

pub mod clips;
pub mod graph;
pub mod scope;
pub mod sites;
pub mod templates;

use self::clips::ClipScope;
use self::graph::{NodeName, ReadGraph, EDGE_CLIP, EDGE_LOCAL, EDGE_SITE};
use self::scope::{PairedEndScope, INSERTION_CHROM};
use self::sites::{SiteIndex, SiteRecord};
use self::templates::TemplateEdges;

/// Kind of SV signal a node was derived from. Discriminants below 2 are
/// between-read signals (two records witness the event); the rest live
/// within a single record's CIGAR or clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadType {
    Discordant = 0,
    Split = 1,
    Deletion = 2,
    Insertion = 3,
    Breakend = 4,
}

impl ReadType {
    pub fn within_read(self) -> bool {
        self as u8 >= 2
    }
}

/// One breakpoint pair derived from a record.
#[derive(Debug, Clone, Copy)]
struct Event {
    kind: ReadType,
    event_pos: i64,
    c2: i32,
    p2: i64,
    cigar_index: i32,
    len_cigar: u32,
}

/// A resolved group of reads likely witnessing one SV, handed to the
/// downstream classifier.
pub struct SvCandidate {
    /// Strongly connected partitions of the group.
    pub parts: Vec<Vec<u32>>,
    /// Facing node sets per linked partition pair.
    pub s_between: HashMap<(usize, usize), (Vec<u32>, Vec<u32>)>,
    /// Per partition, the nodes with only intra-partition neighbours.
    pub s_within: HashMap<usize, Vec<u32>>,
    pub reads: HashMap<u32, Alignment>,
    pub n2n: HashMap<u32, NodeName>,
    /// Site records for prior-site nodes in the group.
    pub info: Option<HashMap<u32, SiteRecord>>,
}

/// Incrementally builds the read-association graph: classifies each
/// admitted alignment, derives its breakpoint pairs, links it against the
/// sliding scopes and resolves connected components into SV candidates.
pub struct GraphBuilder {
    opts: Options,
    max_dist: i64,
    graph: ReadGraph,
    pe_scope: PairedEndScope,
    clip_scope: ClipScope,
    template_edges: TemplateEdges,
    sites: Option<SiteIndex>,
    reference_ids: HashMap<String, i32>,
    read_buffer: HashMap<u32, Alignment>,
    buffer_reads: bool,
    clip_partners: Vec<u32>,
}

impl GraphBuilder {
    pub fn new(
        opts: &Options,
        props: &AlignmentProperties,
        n_references: usize,
        reference_ids: HashMap<String, i32>,
        sites: Option<SiteIndex>,
        random_access: bool,
    ) -> Self {
        let max_dist = props.max_dist(opts.paired_end);
        let clst_dist = props.clst_dist(opts.paired_end);
        let read_length = if props.read_length > 0 {
            props.read_length
        } else {
            opts.read_length
        };
        GraphBuilder {
            opts: opts.clone(),
            max_dist,
            graph: ReadGraph::new(),
            pe_scope: PairedEndScope::new(
                max_dist,
                clst_dist,
                n_references,
                opts.norm_thresh,
                opts.spd_thresh,
                opts.paired_end,
            ),
            clip_scope: ClipScope::new(
                opts.k,
                opts.m,
                opts.clip_l,
                max_dist,
                opts.minimizer_support_thresh,
                read_length,
            ),
            template_edges: TemplateEdges::new(),
            sites,
            reference_ids,
            read_buffer: HashMap::new(),
            buffer_reads: !random_access,
            clip_partners: Vec::new(),
        }
    }

    /// Convenience constructor pulling reference names from the stream.
    pub fn from_stream<S: RecordStream>(
        opts: &Options,
        props: &AlignmentProperties,
        stream: &S,
        sites: Option<SiteIndex>,
    ) -> Self {
        let n_references = stream.n_references();
        let reference_ids = (0..n_references as i32)
            .filter_map(|tid| stream.reference_name(tid).map(|name| (name, tid)))
            .collect();
        Self::new(
            opts,
            props,
            n_references,
            reference_ids,
            sites,
            stream.supports_random_access(),
        )
    }

    pub fn graph(&self) -> &ReadGraph {
        &self.graph
    }

    pub fn max_dist(&self) -> i64 {
        self.max_dist
    }

    /// Classify one admitted alignment and grow the graph with its events.
    pub fn process_alignment(&mut self, rec: Alignment, tell: u64) -> Result<()> {
        if rec.flag & flags::SKIP != 0 || rec.cigar.is_empty() {
            return Ok(());
        }
        let events = self.classify(&rec);
        if events.is_empty() {
            return Ok(());
        }
        let mut nodes = Vec::with_capacity(events.len());
        for event in &events {
            nodes.push(self.add_to_graph(&rec, tell, event));
        }
        if self.buffer_reads {
            for &node in &nodes {
                self.read_buffer.insert(node, rec.clone());
            }
            if self.read_buffer.len() > self.opts.buffer_size {
                return Err(Error::BufferOverflow {
                    capacity: self.opts.buffer_size,
                }
                .into());
            }
        }
        Ok(())
    }

    fn classify(&self, rec: &Alignment) -> Vec<Event> {
        let mut events = Vec::new();

        // within-read CIGAR events first
        let mut ref_pos = rec.pos;
        for (i, op) in rec.cigar.iter().enumerate() {
            match *op {
                Cigar::Del(l) => {
                    if l >= self.opts.min_sv_size {
                        events.push(Event {
                            kind: ReadType::Deletion,
                            event_pos: ref_pos,
                            c2: rec.tid,
                            p2: ref_pos + i64::from(l),
                            cigar_index: i as i32,
                            len_cigar: l,
                        });
                    }
                    ref_pos += i64::from(l);
                }
                Cigar::Ins(l) => {
                    if l >= self.opts.min_sv_size {
                        events.push(Event {
                            kind: ReadType::Insertion,
                            event_pos: ref_pos,
                            c2: INSERTION_CHROM,
                            p2: ref_pos + i64::from(l),
                            cigar_index: i as i32,
                            len_cigar: l,
                        });
                    }
                }
                Cigar::Match(l) | Cigar::Equal(l) | Cigar::Diff(l) | Cigar::RefSkip(l) => {
                    ref_pos += i64::from(l);
                }
                _ => {}
            }
        }

        let left = rec.left_clip();
        let right = rec.right_clip();
        let last_index = rec.cigar.len() as i32 - 1;
        let sa_target = rec.sa_entries().into_iter().find_map(|entry| {
            self.reference_ids
                .get(&entry.rname)
                .map(|&tid| (tid, entry.pos))
        });

        if let Some((sa_tid, sa_pos)) = sa_target {
            // split read: the harder-clipped end faces the SA partner, the
            // opposite clipped end becomes a breakpoint of its own
            let (event_pos, cigar_index, other_pos, other_index, other_clip) = if right >= left {
                (rec.reference_end(), last_index, rec.pos, 0, left)
            } else {
                (rec.pos, 0, rec.reference_end(), last_index, right)
            };
            events.push(Event {
                kind: ReadType::Split,
                event_pos,
                c2: sa_tid,
                p2: sa_pos,
                cigar_index,
                len_cigar: 0,
            });
            if other_clip >= self.opts.clip_length {
                events.push(Event {
                    kind: ReadType::Split,
                    event_pos: other_pos,
                    c2: rec.tid,
                    p2: other_pos,
                    cigar_index: other_index,
                    len_cigar: 0,
                });
            }
        } else if rec.is_paired() && rec.is_mate_unmapped() {
            let event_pos = if right >= left {
                rec.reference_end()
            } else {
                rec.pos
            };
            events.push(Event {
                kind: ReadType::Breakend,
                event_pos,
                c2: rec.tid,
                p2: event_pos,
                cigar_index: -1,
                len_cigar: 0,
            });
        } else if rec.is_paired()
            && rec.mtid >= 0
            && (!rec.is_proper_pair() || rec.mtid != rec.tid || rec.tlen.abs() >= self.max_dist)
        {
            // discordant pair: breakpoint at the mate-facing end
            let event_pos = if rec.is_reverse() {
                rec.pos
            } else {
                rec.reference_end()
            };
            events.push(Event {
                kind: ReadType::Discordant,
                event_pos,
                c2: rec.mtid,
                p2: rec.mpos,
                cigar_index: -1,
                len_cigar: 0,
            });
        } else if left.max(right) >= self.opts.clip_length {
            let (event_pos, cigar_index) = if right >= left {
                (rec.reference_end(), last_index)
            } else {
                (rec.pos, 0)
            };
            events.push(Event {
                kind: ReadType::Breakend,
                event_pos,
                c2: rec.tid,
                p2: event_pos,
                cigar_index,
                len_cigar: 0,
            });
        }
        events
    }

    fn add_to_graph(&mut self, rec: &Alignment, tell: u64, event: &Event) -> u32 {
        let node = self.graph.add_node(NodeName {
            hash: rec.qname_hash(),
            flag: rec.flag,
            pos: rec.pos,
            chrom: rec.tid,
            tell,
            cigar_index: event.cigar_index,
            event_pos: event.event_pos,
        });

        if let Some(sites) = self.sites.as_mut() {
            sites.add_any_sites(rec.tid, rec.pos, &mut self.graph, &mut self.pe_scope);
            if let Some(site_node) = sites.find_nearest_site(rec.tid, event.event_pos) {
                self.graph.add_edge(node, site_node, EDGE_SITE);
            }
        }

        if matches!(event.kind, ReadType::Split | ReadType::Breakend) {
            let mut partners = std::mem::take(&mut self.clip_partners);
            partners.clear();
            self.clip_scope
                .update(rec, node, rec.tid, event.event_pos, &mut partners);
            for &partner in &partners {
                self.graph.add_edge(node, partner, EDGE_CLIP);
            }
            self.clip_partners = partners;
        }

        let multi_mapping = rec.mapq < self.opts.mapq_thresh;
        if !(multi_mapping && self.opts.mm_only) {
            let partners = self.pe_scope.find_other_nodes(
                node,
                rec.tid,
                event.event_pos,
                event.c2,
                event.p2,
                event.kind,
                event.len_cigar,
                self.opts.trust_ins_len,
            );
            for partner in partners {
                self.graph.add_edge(node, partner, EDGE_LOCAL);
            }
            self.pe_scope.add_item(
                node,
                rec.tid,
                event.event_pos,
                event.c2,
                event.p2,
                event.kind,
                event.len_cigar,
            );
        }

        if !event.kind.within_read() {
            self.template_edges
                .add(&rec.qname, rec.query_start(), node, rec.flag);
        }
        node
    }

    /// Flush template edges, extract connected components and resolve them
    /// into SV candidates. When reads were not buffered, `stream` is used to
    /// re-read them through their `tell` cursors.
    pub fn finish<S: RecordStream>(
        &mut self,
        mut stream: Option<&mut S>,
    ) -> Result<Vec<SvCandidate>> {
        self.template_edges.flush(&mut self.graph);
        let components = self.graph.connected_components();
        debug!(
            "graph: {} nodes, {} edges, {} components",
            self.graph.node_count(),
            self.graph.edge_count(),
            components.len()
        );
        let mut candidates = Vec::new();
        for component in components {
            let parts = self.graph.get_partitions(&component);
            let jobs = if parts.len() <= 1 {
                vec![component]
            } else {
                self.graph
                    .break_large_component(&component, self.opts.min_support)
            };
            for job in jobs {
                let mut candidate = self.assemble(&job);
                self.attach_reads(&job, &mut candidate, &mut stream)?;
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    fn assemble(&self, nodes: &[u32]) -> SvCandidate {
        let parts = self.graph.get_partitions(nodes);
        let support = self.graph.count_support_between(&parts);
        let n2n = nodes.iter().map(|&n| (n, *self.graph.node(n))).collect();
        let info = self
            .sites
            .as_ref()
            .map(|sites| {
                nodes
                    .iter()
                    .filter_map(|&n| sites.site(n).map(|site| (n, site.clone())))
                    .collect::<HashMap<_, _>>()
            })
            .filter(|map| !map.is_empty());
        SvCandidate {
            parts,
            s_between: support.between,
            s_within: support.within,
            reads: HashMap::new(),
            n2n,
            info,
        }
    }

    fn attach_reads<S: RecordStream>(
        &self,
        nodes: &[u32],
        candidate: &mut SvCandidate,
        stream: &mut Option<&mut S>,
    ) -> Result<()> {
        for &node in nodes {
            if let Some(sites) = &self.sites {
                if sites.site(node).is_some() {
                    continue;
                }
            }
            if self.buffer_reads {
                if let Some(rec) = self.read_buffer.get(&node) {
                    candidate.reads.insert(node, rec.clone());
                }
            } else if let Some(s) = stream.as_mut() {
                let tell = self.graph.node(node).tell;
                s.seek(tell)?;
                if let Some((rec, _)) = s.next_record()? {
                    candidate.reads.insert(node, rec);
                }
            }
        }
        Ok(())
    }
}

/// Run the full pipeline over a stream: estimate alignment properties, scan
/// (optionally region restricted), build the graph and resolve candidates.
pub fn scan_and_cluster<S: RecordStream>(
    stream: &mut S,
    opts: &Options,
    regions: Option<Vec<Interval>>,
    sites: Option<SiteIndex>,
) -> Result<Vec<SvCandidate>> {
    let props = AlignmentProperties::estimate(stream)?;
    let n_references = stream.n_references();
    let lengths: Vec<u64> = (0..n_references as i32)
        .map(|tid| stream.reference_length(tid).unwrap_or(0))
        .collect();
    let mut scanner = match regions {
        Some(intervals) => {
            GenomeScanner::with_regions(opts.max_cov, opts.clip_length, &lengths, intervals)
        }
        None => GenomeScanner::new(opts.max_cov, opts.clip_length, &lengths),
    };
    let mut builder = GraphBuilder::from_stream(opts, &props, stream, sites);
    while let Some(batch) = scanner.next_batch(stream)? {
        for (rec, tell) in batch {
            builder.process_alignment(rec, tell)?;
        }
    }
    if scanner.reads_dropped > 0 {
        debug!("{} reads dropped in over-covered bins", scanner.reads_dropped);
    }
    builder.finish(Some(stream))
}
