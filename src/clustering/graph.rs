// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

/// Edge weights by link kind. Only weights above `EDGE_TEMPLATE` count as
/// clustering strength.
pub const EDGE_SITE: u8 = 0;
pub const EDGE_TEMPLATE: u8 = 1;
pub const EDGE_LOCAL: u8 = 2;
pub const EDGE_CLIP: u8 = 3;

/// One alignment occurrence in the read-association graph.
///
/// `cigar_index` is the CIGAR op the node was derived from, or -1 for
/// whole-read nodes; whole-read nodes count double towards support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeName {
    pub hash: u64,
    pub flag: u16,
    pub pos: i64,
    pub chrom: i32,
    pub tell: u64,
    pub cigar_index: i32,
    pub event_pos: i64,
}

impl NodeName {
    pub fn support(&self) -> u32 {
        if self.cigar_index == -1 {
            2
        } else {
            1
        }
    }
}

/// Node sets facing each other across partition boundaries, plus the nodes
/// whose neighbours all stay within their own partition.
pub struct SupportBetween {
    pub between: HashMap<(usize, usize), (Vec<u32>, Vec<u32>)>,
    pub within: HashMap<usize, Vec<u32>>,
}

/// Undirected weighted multigraph over dense integer node ids. Edge
/// insertion is idempotent: a second edge between the same pair is ignored.
pub struct ReadGraph {
    inner: UnGraph<NodeName, u8>,
}

impl Default for ReadGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadGraph {
    pub fn new() -> Self {
        ReadGraph {
            inner: UnGraph::new_undirected(),
        }
    }

    pub fn add_node(&mut self, name: NodeName) -> u32 {
        self.inner.add_node(name).index() as u32
    }

    pub fn add_edge(&mut self, u: u32, v: u32, weight: u8) {
        let (a, b) = (NodeIndex::new(u as usize), NodeIndex::new(v as usize));
        if self.inner.find_edge(a, b).is_none() {
            self.inner.add_edge(a, b, weight);
        }
    }

    pub fn has_edge(&self, u: u32, v: u32) -> bool {
        self.inner
            .find_edge(NodeIndex::new(u as usize), NodeIndex::new(v as usize))
            .is_some()
    }

    pub fn edge_weight(&self, u: u32, v: u32) -> Option<u8> {
        self.inner
            .find_edge(NodeIndex::new(u as usize), NodeIndex::new(v as usize))
            .and_then(|e| self.inner.edge_weight(e))
            .copied()
    }

    pub fn node(&self, u: u32) -> &NodeName {
        &self.inner[NodeIndex::new(u as usize)]
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Neighbours of `u` with the connecting edge weight.
    pub fn neighbors(&self, u: u32) -> impl Iterator<Item = (u32, u8)> + '_ {
        let idx = NodeIndex::new(u as usize);
        self.inner.edges(idx).map(move |e| {
            let other = if e.source() == idx { e.target() } else { e.source() };
            (other.index() as u32, *e.weight())
        })
    }

    /// Connected components over edges of any weight, in node-id order.
    pub fn connected_components(&self) -> Vec<Vec<u32>> {
        let mut visited = vec![false; self.inner.node_count()];
        let mut components = Vec::new();
        for start in 0..self.inner.node_count() as u32 {
            if visited[start as usize] {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::new();
            visited[start as usize] = true;
            queue.push_back(start);
            while let Some(u) = queue.pop_front() {
                component.push(u);
                for (v, _) in self.neighbors(u) {
                    if !visited[v as usize] {
                        visited[v as usize] = true;
                        queue.push_back(v);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    /// Split a component into maximal groups connected by strong
    /// (weight > 1) edges. Site and template edges are not traversed.
    pub fn get_partitions(&self, component: &[u32]) -> Vec<Vec<u32>> {
        let members: HashSet<u32> = component.iter().copied().collect();
        let mut visited: HashSet<u32> = HashSet::new();
        let mut partitions = Vec::new();
        for &start in component {
            if visited.contains(&start) {
                continue;
            }
            visited.insert(start);
            let mut part = Vec::new();
            let mut queue = VecDeque::new();
            queue.push_back(start);
            while let Some(u) = queue.pop_front() {
                part.push(u);
                for (v, w) in self.neighbors(u) {
                    if w > EDGE_TEMPLATE && members.contains(&v) && !visited.contains(&v) {
                        visited.insert(v);
                        queue.push_back(v);
                    }
                }
            }
            part.sort_unstable();
            partitions.push(part);
        }
        partitions
    }

    /// For every pair of partitions connected by at least one edge, collect
    /// the facing node sets (once per ordered pair), and per partition the
    /// nodes with only intra-partition neighbours.
    pub fn count_support_between(&self, parts: &[Vec<u32>]) -> SupportBetween {
        let mut part_of: HashMap<u32, usize> = HashMap::new();
        for (i, part) in parts.iter().enumerate() {
            for &u in part {
                part_of.insert(u, i);
            }
        }
        let mut between: HashMap<(usize, usize), (HashSet<u32>, HashSet<u32>)> = HashMap::new();
        let mut within: HashMap<usize, Vec<u32>> = HashMap::new();
        for (i, part) in parts.iter().enumerate() {
            for &u in part {
                let mut external = false;
                for (v, _) in self.neighbors(u) {
                    if let Some(&j) = part_of.get(&v) {
                        if j != i {
                            external = true;
                            let key = (i.min(j), i.max(j));
                            let entry = between.entry(key).or_default();
                            if i < j {
                                entry.0.insert(u);
                            } else {
                                entry.1.insert(u);
                            }
                        }
                    }
                }
                if !external {
                    within.entry(i).or_default().push(u);
                }
            }
        }
        let between = between
            .into_iter()
            .map(|(k, (a, b))| {
                let mut a: Vec<u32> = a.into_iter().collect();
                let mut b: Vec<u32> = b.into_iter().collect();
                a.sort_unstable();
                b.sort_unstable();
                (k, (a, b))
            })
            .collect();
        SupportBetween { between, within }
    }

    /// Resolve a large component into SV-candidate jobs: partitions whose
    /// inter-partition link count reaches `min_support` are concatenated;
    /// a partition stands alone when the summed support of its internal
    /// nodes reaches `min_support`.
    pub fn break_large_component(&self, component: &[u32], min_support: u32) -> Vec<Vec<u32>> {
        let parts = self.get_partitions(component);
        if parts.len() <= 1 {
            return parts;
        }
        let mut part_of: HashMap<u32, usize> = HashMap::new();
        for (i, part) in parts.iter().enumerate() {
            for &u in part {
                part_of.insert(u, i);
            }
        }
        // count links (edges), not node support, between partition pairs
        let mut links: HashMap<(usize, usize), u32> = HashMap::new();
        for &u in component {
            for (v, _) in self.neighbors(u) {
                if u < v {
                    if let (Some(&i), Some(&j)) = (part_of.get(&u), part_of.get(&v)) {
                        if i != j {
                            *links.entry((i.min(j), i.max(j))).or_insert(0) += 1;
                        }
                    }
                }
            }
        }
        let mut merge = DisjointSet::new(parts.len());
        let mut linked = vec![false; parts.len()];
        for (&(i, j), &n) in &links {
            if n >= min_support {
                merge.union(i, j);
                linked[i] = true;
                linked[j] = true;
            }
        }
        let support = self.count_support_between(&parts);
        let mut jobs: HashMap<usize, Vec<u32>> = HashMap::new();
        for (i, part) in parts.iter().enumerate() {
            let self_support: u32 = support
                .within
                .get(&i)
                .map(|nodes| nodes.iter().map(|&u| self.node(u).support()).sum())
                .unwrap_or(0);
            if linked[i] || self_support >= min_support {
                jobs.entry(merge.find(i)).or_default().extend(part.iter().copied());
            }
        }
        let mut jobs: Vec<Vec<u32>> = jobs
            .into_iter()
            .map(|(_, mut nodes)| {
                nodes.sort_unstable();
                nodes
            })
            .collect();
        jobs.sort();
        jobs
    }
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}
