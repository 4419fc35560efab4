// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{HashMap, VecDeque};

use rust_htslib::bam::record::{Cigar, CigarString};

use svgraph::records::flags;
use svgraph::{
    scan_and_cluster, Alignment, AlignmentProperties, Error, GraphBuilder, MemoryStream, Options,
    OptionsBuilder, SiteIndex, SiteRecord, SvCandidate, SvType,
};

fn references() -> Vec<(String, u64)> {
    vec![("chr1".to_owned(), 200_000), ("chr2".to_owned(), 200_000)]
}

fn record(qname: &str, flag: u16, tid: i32, pos: i64, cigar: Vec<Cigar>) -> Alignment {
    let read_len: usize = cigar
        .iter()
        .map(|op| match op {
            Cigar::Match(l) | Cigar::Ins(l) | Cigar::SoftClip(l) | Cigar::Equal(l)
            | Cigar::Diff(l) => *l as usize,
            _ => 0,
        })
        .sum();
    Alignment {
        qname: qname.as_bytes().to_vec(),
        flag,
        tid,
        pos,
        mtid: -1,
        mpos: -1,
        mapq: 60,
        tlen: 0,
        cigar: CigarString(cigar),
        seq: vec![b'A'; read_len],
        quals: vec![30; read_len],
        sa: None,
        extended: false,
    }
}

fn pair(qname: &str, pos: i64, mpos: i64, forward: bool) -> Alignment {
    let mut flag = flags::PAIRED | flags::PROPER_PAIR;
    if forward {
        flag |= flags::FIRST_IN_PAIR;
    } else {
        flag |= flags::REVERSE;
    }
    let mut rec = record(qname, flag, 0, pos, vec![Cigar::Match(100)]);
    rec.mtid = 0;
    rec.mpos = mpos;
    rec.tlen = if forward { mpos - pos + 100 } else { -(pos - mpos + 100) };
    rec
}

fn props() -> AlignmentProperties {
    AlignmentProperties {
        read_length: 100,
        insert_median: 300.0,
        insert_stdev: 40.0,
        extended_tags: false,
    }
}

fn builder(opts: &Options) -> GraphBuilder {
    let reference_ids: HashMap<String, i32> =
        vec![("chr1".to_owned(), 0), ("chr2".to_owned(), 1)].into_iter().collect();
    GraphBuilder::new(opts, &props(), 2, reference_ids, None, true)
}

fn candidate_parts(candidates: &[SvCandidate]) -> Vec<Vec<Vec<u32>>> {
    candidates.iter().map(|c| c.parts.clone()).collect()
}

#[test]
fn test_discordant_pair_joins_through_template_edge() {
    // one read pair spanning a 4 kb event: each mate becomes a DISCORDANT
    // node; the template edge joins them
    let opts = OptionsBuilder::default().min_support(1).build().unwrap();
    let mut b = builder(&opts);
    b.process_alignment(pair("t1", 1000, 5000, true), 0).unwrap();
    b.process_alignment(pair("t1", 5000, 1000, false), 1).unwrap();
    let candidates = b.finish::<MemoryStream>(None).unwrap();

    assert_eq!(b.graph().node_count(), 2);
    assert_eq!(b.graph().edge_weight(0, 1), Some(1));
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].parts, vec![vec![0], vec![1]]);
    let (left, right) = &candidates[0].s_between[&(0, 1)];
    assert_eq!(left, &vec![0]);
    assert_eq!(right, &vec![1]);
    assert_eq!(candidates[0].n2n[&0].cigar_index, -1);
}

#[test]
fn test_split_reads_link_via_exact_bucket() {
    let opts = OptionsBuilder::default().min_support(1).build().unwrap();
    let mut b = builder(&opts);
    let mut r1 = record("s1", 0, 0, 1000, vec![Cigar::Match(70), Cigar::SoftClip(30)]);
    r1.sa = Some("chr2,9001,+,30M70S,60,0;".to_owned());
    let mut r2 = record("s2", 0, 0, 1005, vec![Cigar::Match(70), Cigar::SoftClip(30)]);
    r2.sa = Some("chr2,9004,+,30M70S,60,0;".to_owned());
    // distinct clip sequences keep the minimizer index out of the picture
    r2.seq = vec![b'C'; 100];
    b.process_alignment(r1, 0).unwrap();
    b.process_alignment(r2, 1).unwrap();
    let candidates = b.finish::<MemoryStream>(None).unwrap();

    assert_eq!(b.graph().node_count(), 2);
    assert_eq!(b.graph().edge_weight(0, 1), Some(2));
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].parts, vec![vec![0, 1]]);
    assert_eq!(candidates[0].s_within[&0], vec![0, 1]);
}

#[test]
fn test_split_read_with_two_clips_yields_both_end_nodes() {
    let opts = OptionsBuilder::default().min_support(1).build().unwrap();
    let mut b = builder(&opts);
    let mut r = record(
        "s1",
        0,
        0,
        1000,
        vec![Cigar::SoftClip(40), Cigar::Match(30), Cigar::SoftClip(40)],
    );
    r.sa = Some("chr2,9001,+,40M70S,60,0;".to_owned());
    b.process_alignment(r, 0).unwrap();
    b.finish::<MemoryStream>(None).unwrap();

    assert_eq!(b.graph().node_count(), 2);
    let indices: Vec<i32> = (0..2).map(|n| b.graph().node(n).cigar_index).collect();
    assert!(indices.contains(&0));
    assert!(indices.contains(&2));
    // segments of one template are joined by a weight-1 edge
    assert_eq!(b.graph().edge_weight(0, 1), Some(1));
}

#[test]
fn test_within_read_deletions_link() {
    let opts = OptionsBuilder::default().min_support(1).build().unwrap();
    let mut b = builder(&opts);
    let r1 = record(
        "d1",
        0,
        0,
        9950,
        vec![Cigar::Match(50), Cigar::Del(1000), Cigar::Match(50)],
    );
    let r2 = record(
        "d2",
        0,
        0,
        9953,
        vec![Cigar::Match(50), Cigar::Del(999), Cigar::Match(50)],
    );
    b.process_alignment(r1, 0).unwrap();
    b.process_alignment(r2, 1).unwrap();
    b.finish::<MemoryStream>(None).unwrap();

    assert_eq!(b.graph().node_count(), 2);
    let first = b.graph().node(0);
    assert_eq!(first.event_pos, 10_000);
    assert_eq!(first.cigar_index, 1);
    // a CIGAR-derived node sits inside its record's reference span
    assert!(first.event_pos >= first.pos);
    assert_eq!(b.graph().edge_weight(0, 1), Some(2));
}

#[test]
fn test_clip_minimizers_link_breakends() {
    let opts = OptionsBuilder::default().min_support(1).build().unwrap();
    let mut b = builder(&opts);
    let clip: Vec<u8> = b"ACGTACGGTTCAGGCATTACGGATCGATTACGGCAATTGCAGGTCCGATA".to_vec();
    let mut r1 = record("b1", 0, 0, 2000, vec![Cigar::SoftClip(50), Cigar::Match(50)]);
    r1.seq[..50].copy_from_slice(&clip);
    let mut r2 = record("b2", 0, 0, 2010, vec![Cigar::SoftClip(50), Cigar::Match(50)]);
    r2.seq[..50].copy_from_slice(&clip);
    b.process_alignment(r1, 0).unwrap();
    b.process_alignment(r2, 1).unwrap();
    b.finish::<MemoryStream>(None).unwrap();

    assert_eq!(b.graph().node_count(), 2);
    assert_eq!(b.graph().edge_weight(0, 1), Some(3));
}

#[test]
fn test_unmapped_mate_wins_over_discordant() {
    // mate-unmapped records conventionally carry their own coordinates in
    // rnext/pnext, so they must become breakends anchored at the read's own
    // end even when the discordant predicate (paired, not proper, mapped
    // rnext) would also match. Classified as discordant, the two mate loci
    // here (50 kb and 90 kb) could never pair; as breakends they link at
    // their shared position.
    let opts = OptionsBuilder::default().min_support(1).build().unwrap();
    let mut b = builder(&opts);
    let mut r1 = record(
        "u1",
        flags::PAIRED | flags::MATE_UNMAPPED,
        0,
        2000,
        vec![Cigar::Match(100)],
    );
    r1.mtid = 0;
    r1.mpos = 50_000;
    let mut r2 = record(
        "u2",
        flags::PAIRED | flags::MATE_UNMAPPED,
        0,
        2010,
        vec![Cigar::Match(100)],
    );
    r2.mtid = 0;
    r2.mpos = 90_000;
    b.process_alignment(r1, 0).unwrap();
    b.process_alignment(r2, 1).unwrap();
    b.finish::<MemoryStream>(None).unwrap();

    assert_eq!(b.graph().node_count(), 2);
    // breakends anchor at the read's own aligned end, not at pnext
    assert_eq!(b.graph().node(0).event_pos, 2100);
    assert_eq!(b.graph().node(1).event_pos, 2110);
    assert_eq!(b.graph().edge_weight(0, 1), Some(2));
}

#[test]
fn test_buffer_overflow_without_random_access() {
    let opts = OptionsBuilder::default().buffer_size(1).build().unwrap();
    let reference_ids: HashMap<String, i32> =
        vec![("chr1".to_owned(), 0)].into_iter().collect();
    let mut b = GraphBuilder::new(&opts, &props(), 1, reference_ids, None, false);
    let r1 = record("b1", 0, 0, 2000, vec![Cigar::SoftClip(50), Cigar::Match(50)]);
    let r2 = record("b2", 0, 0, 2500, vec![Cigar::SoftClip(50), Cigar::Match(50)]);
    b.process_alignment(r1, 0).unwrap();
    let err = b.process_alignment(r2, 1).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::BufferOverflow { capacity: 1 })
    ));
}

fn discordant_cluster() -> Vec<Alignment> {
    vec![
        pair("t1", 1000, 5000, true),
        pair("t2", 1010, 5010, true),
        pair("t3", 1020, 5020, true),
        pair("t1", 5000, 1000, false),
        pair("t2", 5010, 1010, false),
        pair("t3", 5020, 1020, false),
    ]
}

#[test]
fn test_full_pipeline_resolves_discordant_cluster() {
    let opts = OptionsBuilder::default().build().unwrap();
    let mut stream = MemoryStream::new(references(), discordant_cluster());
    let candidates = scan_and_cluster(&mut stream, &opts, None, None).unwrap();

    assert_eq!(candidates.len(), 1);
    let cand = &candidates[0];
    // forward breakends and reverse breakends form the two partitions,
    // merged into one candidate by their template links
    assert_eq!(cand.parts, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    let (left, right) = &cand.s_between[&(0, 1)];
    assert_eq!(left, &vec![0, 1, 2]);
    assert_eq!(right, &vec![3, 4, 5]);
    assert_eq!(cand.n2n.len(), 6);
    // reads come back through their tell cursors
    assert_eq!(cand.reads.len(), 6);
    assert_eq!(cand.reads[&0].qname, b"t1".to_vec());
    assert_eq!(cand.reads[&5].pos, 5020);
}

#[test]
fn test_scan_is_deterministic() {
    let opts = OptionsBuilder::default().build().unwrap();
    let mut first = MemoryStream::new(references(), discordant_cluster());
    let mut second = MemoryStream::new(references(), discordant_cluster());
    let a = scan_and_cluster(&mut first, &opts, None, None).unwrap();
    let b = scan_and_cluster(&mut second, &opts, None, None).unwrap();
    assert_eq!(candidate_parts(&a), candidate_parts(&b));
    let names_a: Vec<_> = a.iter().map(|c| {
        let mut n: Vec<_> = c.n2n.values().map(|v| (v.hash, v.event_pos)).collect();
        n.sort_unstable();
        n
    }).collect();
    let names_b: Vec<_> = b.iter().map(|c| {
        let mut n: Vec<_> = c.n2n.values().map(|v| (v.hash, v.event_pos)).collect();
        n.sort_unstable();
        n
    }).collect();
    assert_eq!(names_a, names_b);
}

#[test]
fn test_region_restricted_matches_whole_genome() {
    let opts = OptionsBuilder::default().build().unwrap();
    let mut whole = MemoryStream::new(references(), discordant_cluster());
    let mut restricted = MemoryStream::new(references(), discordant_cluster());
    let a = scan_and_cluster(&mut whole, &opts, None, None).unwrap();
    let b = scan_and_cluster(
        &mut restricted,
        &opts,
        Some(vec![(0, 0, 200_000), (1, 0, 200_000)]),
        None,
    )
    .unwrap();
    assert_eq!(candidate_parts(&a), candidate_parts(&b));
}

#[test]
fn test_prior_sites_attach_with_weight_zero_edges() {
    let opts = OptionsBuilder::default().min_support(2).build().unwrap();
    let site = SiteRecord {
        chrom: 0,
        start: 5000,
        chrom2: 0,
        end: 6000,
        svtype: SvType::Deletion,
        svlen: 1000,
    };
    let mut sites: HashMap<i32, VecDeque<SiteRecord>> = HashMap::new();
    sites.entry(0).or_default().push_back(site);
    let site_index = SiteIndex::new(sites, 500);

    let records = vec![
        record(
            "d1",
            0,
            0,
            4952,
            vec![Cigar::Match(50), Cigar::Del(998), Cigar::Match(50)],
        ),
        record(
            "d2",
            0,
            0,
            4955,
            vec![Cigar::Match(50), Cigar::Del(997), Cigar::Match(50)],
        ),
    ];
    let mut stream = MemoryStream::new(references(), records);
    let candidates = scan_and_cluster(&mut stream, &opts, None, Some(site_index)).unwrap();

    assert_eq!(candidates.len(), 1);
    let cand = &candidates[0];
    // node 0 and 2 are the reads, node 1 the injected site
    let info = cand.info.as_ref().expect("site info present");
    assert_eq!(info.len(), 1);
    assert!(info.contains_key(&1));
    assert_eq!(info[&1].svtype, SvType::Deletion);
    // the site node carries no read
    assert_eq!(cand.reads.len(), 2);
    assert!(cand.reads.contains_key(&0));
    assert!(cand.reads.contains_key(&2));
}
