// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Streaming signal extraction and clustering for structural variant
//! discovery. A single pass over a coordinate-sorted alignment stream
//! classifies reads that carry SV signal (split alignments, discordant
//! pairs, within-read indels, informative soft clips, unmapped-mate
//! breakends) and incrementally builds a read-association graph whose
//! connected components group the reads witnessing one SV event. The
//! resolved components are handed to a downstream classifier.

pub mod clustering;
pub mod errors;
pub mod estimation;
pub mod options;
pub mod records;
pub mod scanning;

pub use crate::clustering::graph::{NodeName, ReadGraph};
pub use crate::clustering::sites::{SiteIndex, SiteRecord, SvType};
pub use crate::clustering::{scan_and_cluster, GraphBuilder, ReadType, SvCandidate};
pub use crate::errors::Error;
pub use crate::estimation::alignment_properties::AlignmentProperties;
pub use crate::options::{Options, OptionsBuilder};
pub use crate::records::stream::{MemoryStream, RecordStream};
pub use crate::records::Alignment;
pub use crate::scanning::GenomeScanner;
