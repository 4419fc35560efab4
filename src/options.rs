// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use derive_builder::Builder;

/// Engine configuration. All thresholds carry the defaults the scanner and
/// scopers were tuned with; hosts override individual fields through
/// `OptionsBuilder`.
#[derive(Builder, Debug, Clone)]
#[builder(pattern = "owned")]
pub struct Options {
    /// Per-100-bp-bin depth cap; bins at or above it are suppressed outside
    /// regions of interest.
    #[builder(default = "200")]
    pub max_cov: u32,
    /// Maximum number of alignments retained when the stream offers no random
    /// access. Exceeding it is fatal.
    #[builder(default = "100_000")]
    pub buffer_size: usize,
    /// Minimum soft-clip length for a clip to count as an SV signal.
    #[builder(default = "30")]
    pub clip_length: u32,
    /// Minimum length of a within-read insertion or deletion.
    #[builder(default = "30")]
    pub min_sv_size: u32,
    /// Matching minimizers required before two clips are declared partners.
    #[builder(default = "2")]
    pub minimizer_support_thresh: u32,
    #[builder(default = "3")]
    pub minimizer_breadth: u32,
    #[builder(default = "10")]
    pub minimizer_dist: u32,
    /// Reads below this mapping quality are treated as multi-mapping.
    #[builder(default = "1")]
    pub mapq_thresh: u8,
    #[builder(default = "true")]
    pub paired_end: bool,
    /// Fallback read length; normally replaced by the estimated value.
    #[builder(default = "150")]
    pub read_length: u32,
    /// Normalization constant for the span-position distance.
    #[builder(default = "100.0")]
    pub norm_thresh: f32,
    /// Acceptance threshold for the span-position distance.
    #[builder(default = "0.3")]
    pub spd_thresh: f32,
    /// Restrict multi-mapping reads to clip-based linking.
    #[builder(default = "false")]
    pub mm_only: bool,
    /// Compare insertion lengths strictly when pairing insertion events.
    #[builder(default = "true")]
    pub trust_ins_len: bool,
    /// Minimizer k-mer size.
    #[builder(default = "16")]
    pub k: usize,
    /// Minimizer window length.
    #[builder(default = "7")]
    pub m: usize,
    /// Minimum clip length admitted to the minimizer index.
    #[builder(default = "21")]
    pub clip_l: u32,
    /// Minimum inter-partition link count (or self support) for a partition
    /// group to become an SV candidate.
    #[builder(default = "3")]
    pub min_support: u32,
}
