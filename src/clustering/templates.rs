// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;

use itertools::Itertools;

use crate::clustering::graph::{ReadGraph, EDGE_TEMPLATE};
use crate::records::flags;

/// Joins the graph nodes of records sharing a template name. Entries are
/// buffered during the scan and resolved in one flush after the last
/// alignment, linking each read's segments in query order and the two
/// reads' primary alignments.
#[derive(Default)]
pub struct TemplateEdges {
    templates: HashMap<Vec<u8>, Vec<(u32, u32, u16)>>,
}

impl TemplateEdges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, qname: &[u8], query_start: u32, node: u32, flag: u16) {
        self.templates
            .entry(qname.to_vec())
            .or_default()
            .push((query_start, node, flag));
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Add weight-1 edges for every buffered template and discard the
    /// buffer. Existing edges between a pair are left untouched.
    pub fn flush(&mut self, graph: &mut ReadGraph) {
        for (_, entries) in self.templates.drain() {
            let (mut read1, mut read2): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .partition(|&(_, _, flag)| flag & flags::FIRST_IN_PAIR != 0);
            let mut primaries = Vec::new();
            for list in [&mut read1, &mut read2].iter_mut() {
                list.sort_unstable_by_key(|&(query_start, _, _)| query_start);
                for (&(_, u, _), &(_, v, _)) in list.iter().tuple_windows() {
                    if u != v {
                        graph.add_edge(u, v, EDGE_TEMPLATE);
                    }
                }
                if let Some(&(_, node, _)) =
                    list.iter().find(|&&(_, _, flag)| flag & flags::NON_PRIMARY == 0)
                {
                    primaries.push(node);
                }
            }
            if let [u, v] = primaries[..] {
                if u != v {
                    graph.add_edge(u, v, EDGE_TEMPLATE);
                }
            }
        }
    }
}
