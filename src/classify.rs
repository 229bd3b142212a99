//! Read classifier: picks the winning aligner-bank hit for each read and
//! tags it into one of the evidence categories.
use std::collections::{HashMap, HashSet};

use anyhow::Result;
use log::debug;

use crate::aligner::{AlignerBank, FLANKMATCH};
use crate::error::CoreError;
use crate::locus::Locus;
use crate::readsource::{Read, ReadSource};

/// Evidence tag assigned to a classified read, as a single sum type rather
/// than a set of independent booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Full,
    Pref,
    Post,
    Rept,
    Hang,
    None,
}

/// One piece of read evidence surviving classification.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub tag: Tag,
    pub h: u32,
    pub read_id: String,
}

/// `tag -> (h -> count)` aggregate built by [`classify_locus`]. PREF and POST
/// share one histogram, since the spec treats the two flanks as symmetric
/// evidence for the same underlying allele-length distribution.
#[derive(Debug, Default, Clone)]
pub struct Counts {
    pub full: HashMap<u32, u32>,
    pub pref_post: HashMap<u32, u32>,
    pub rept: HashMap<u32, u32>,
    /// Diagnostic only; never consumed by the likelihood.
    pub hang: u32,
}

/// `u32::ceil_div` isn't stable; this is the one division the classifier
/// needs rounded up.
fn ceil_div(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Tags a single aligned read against the bank, returning the winning
/// candidate `(tag, h)` or `None` if every hit is discarded.
///
/// `clipped_mode` broadens the REPT rule to use the read's own local
/// ceiling-unit count rather than the bank-wide maximum, per the design
/// decision coupling "clipped reads" with the REPT aggregator switch in
/// [`crate::caller`].
pub fn classify_read(
    bank: &AlignerBank,
    read_seq: &[u8],
    period: usize,
    u_max: u32,
    clipped_mode: bool,
) -> Option<(Tag, u32)> {
    let hits = bank.align(read_seq);
    if hits.is_empty() {
        return None;
    }

    let u_local = ceil_div(read_seq.len(), period).max(1) as u32;
    let mut best: Option<(Tag, u32, i32, u32)> = None; // (tag, h, score, u) ; compare (score, -u)

    for hit in &hits {
        let tag = if hit.is_hang() {
            Tag::Hang
        } else if hit.is_prefix_touch() && hit.is_suffix_touch() {
            Tag::Full
        } else if hit.is_prefix_touch() {
            Tag::Pref
        } else if hit.is_suffix_touch() {
            Tag::Post
        } else {
            let rept_threshold = if clipped_mode {
                u_local.saturating_sub(1)
            } else {
                u_max.saturating_sub(1)
            };
            if hit.u >= rept_threshold && (hit.u as usize) * period <= read_seq.len() {
                Tag::Rept
            } else {
                Tag::None
            }
        };

        if matches!(tag, Tag::None) {
            continue;
        }

        let better = match &best {
            None => true,
            Some((_, _, best_score, best_u)) => {
                hit.score > *best_score || (hit.score == *best_score && hit.u < *best_u)
            }
        };
        if better {
            best = Some((tag, hit.u, hit.score, hit.u));
        }
    }

    best.map(|(tag, h, _, _)| (tag, h))
}

/// `pad = SPAN` used when fetching the primary classification window.
pub const PRIMARY_PAD: i64 = crate::pe::SPAN;

/// Classifies every usable read overlapping the locus's primary window (and,
/// for any configured alt regions, mates that anchor back into the primary
/// window), and folds the results into one [`Counts`] aggregate.
///
/// `clipped_mode` also governs whether pair-of-REPT suppression runs (it is
/// skipped in clipped mode, matching the "include repeat pairs" escape
/// hatch).
pub fn classify_locus(
    locus: &Locus,
    source: &dyn ReadSource,
    readlen: usize,
    clipped_mode: bool,
) -> Result<Counts> {
    let period = locus.period();
    let u_max = ceil_div(readlen, period).max(1) as u32;
    let bank = AlignerBank::build(locus.prefix.as_bytes(), locus.motif.as_bytes(), locus.suffix.as_bytes(), u_max);

    let window_start = locus.start - PRIMARY_PAD;
    let window_end = locus.end + PRIMARY_PAD;
    let mut reads = source
        .fetch(&locus.chromosome, window_start, window_end)
        .map_err(|e| CoreError::InputUnavailable {
            chromosome: locus.chromosome.clone(),
            start: window_start,
            end: window_end,
            reason: e.to_string(),
        })?;

    // Reads whose reference start lies outside the generous window around
    // the repeat are skipped even when fetched, per the scanning strategy:
    // they cannot plausibly carry repeat-tract evidence. Unmapped reads
    // carry no meaningful reference_start (often stale, or the mate's
    // position) and so are exempt: they are classified on sequence alone,
    // matching the "unmapped reads in the window are classified" rule.
    // This filter applies only to the primary-window fetch: alt-region
    // reads are fetched from a genomically distant region by definition and
    // are merged in afterwards, untouched by it.
    let skip_lo = locus.start - readlen as i64;
    let skip_hi = locus.end + readlen as i64;
    reads.retain(|r| r.is_unmapped || (r.reference_start >= skip_lo && r.reference_start < skip_hi));

    for alt in &locus.alt_regions {
        if let Ok(alt_reads) = source.fetch(&alt.chromosome, alt.start, alt.end) {
            let primary_tid = source.contig_id(&locus.chromosome).ok();
            for r in alt_reads {
                let mate_in_primary = primary_tid.is_some() && r.mate_reference_id == primary_tid;
                if mate_in_primary {
                    reads.push(r);
                }
            }
        }
    }

    let mut rept_by_read: HashMap<String, u32> = HashMap::new();
    let mut counts = Counts::default();

    for read in &reads {
        match classify_read(&bank, &read.sequence, period, u_max, clipped_mode) {
            Some((Tag::Hang, _)) => counts.hang += 1,
            Some((Tag::Full, h)) => *counts.full.entry(h).or_default() += 1,
            Some((Tag::Pref, h)) | Some((Tag::Post, h)) => {
                *counts.pref_post.entry(h).or_default() += 1
            }
            Some((Tag::Rept, h)) => {
                *rept_by_read.entry(read.name.clone()).or_default() += 1;
                *counts.rept.entry(h).or_default() += 1;
            }
            Some((Tag::None, _)) | None => {
                debug!("read {} discarded by classifier", read.name);
            }
        }
    }

    if !clipped_mode {
        suppress_rept_pairs(&mut counts, &reads, &bank, period, u_max, clipped_mode, &rept_by_read);
    }

    Ok(counts)
}

/// Removes REPT evidence for any `read_id` that produced a REPT tag on both
/// mates of a pair, since those arise only when the locus itself is used as
/// the fetch reference and would otherwise double count.
fn suppress_rept_pairs(
    counts: &mut Counts,
    reads: &[Read],
    bank: &AlignerBank,
    period: usize,
    u_max: u32,
    clipped_mode: bool,
    rept_by_read: &HashMap<String, u32>,
) {
    let duplicated: HashSet<&String> = rept_by_read
        .iter()
        .filter(|(_, &n)| n >= 2)
        .map(|(id, _)| id)
        .collect();
    if duplicated.is_empty() {
        return;
    }
    for read in reads {
        if !duplicated.contains(&read.name) {
            continue;
        }
        if let Some((Tag::Rept, h)) = classify_read(bank, &read.sequence, period, u_max, clipped_mode) {
            if let Some(count) = counts.rept.get_mut(&h) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.rept.remove(&h);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readsource::test_support::FakeReadSource;

    fn hd_locus() -> Locus {
        crate::locus::LocusRecord {
            name: "HD".into(),
            repeat: "CAG".into(),
            repeat_location: "chr4:3074877-3074933".into(),
            prefix: "CACTTCCTGGTCAGCGCA".into(),
            suffix: "CAGCCGCCAGGGCCCTCA".into(),
            cutoff_prerisk: 36,
            cutoff_risk: 40,
            inheritance: crate::locus::Inheritance::AD,
            mutation_nature: crate::locus::MutationNature::Increase,
            title: "Huntington disease".into(),
        }
        .into_locus(vec![])
        .unwrap()
    }

    fn spanning_read(locus: &Locus, units: u32, name: &str) -> Read {
        let mut seq = Vec::new();
        seq.extend_from_slice(&locus.prefix.as_bytes()[locus.prefix.len() - 12..]);
        for _ in 0..units {
            seq.extend_from_slice(locus.motif.as_bytes());
        }
        seq.extend_from_slice(&locus.suffix.as_bytes()[..12]);
        let len = seq.len() as i64;
        Read {
            name: name.into(),
            sequence: seq,
            is_reverse: false,
            is_first_in_pair: true,
            reference_start: locus.start - 5,
            reference_end: locus.end + 5,
            query_alignment_start: 0,
            query_alignment_end: len,
            query_length: len,
            mate_reference_id: None,
            mate_reference_start: None,
            template_length: 0,
            is_paired: false,
            is_unmapped: false,
            is_duplicate: false,
            is_supplementary: false,
            is_secondary: false,
            mapping_quality: 60,
        }
    }

    #[test]
    fn homozygous_reference_reads_all_classify_full_at_19() {
        let locus = hd_locus();
        let reads: Vec<Read> = (0..10)
            .map(|i| spanning_read(&locus, 19, &format!("r{i}")))
            .collect();
        let source = FakeReadSource {
            reads,
            readlen: 90,
            ..Default::default()
        };
        let counts = classify_locus(&locus, &source, 90, false).unwrap();
        assert_eq!(counts.full.get(&19), Some(&10));
        assert!(counts.pref_post.is_empty());
    }

    #[test]
    fn alt_region_reads_are_recovered_when_mate_anchors_primary() {
        let locus = crate::locus::LocusRecord {
            name: "HD".into(),
            repeat: "CAG".into(),
            repeat_location: "chr4:3074877-3074933".into(),
            prefix: "CACTTCCTGGTCAGCGCA".into(),
            suffix: "CAGCCGCCAGGGCCCTCA".into(),
            cutoff_prerisk: 36,
            cutoff_risk: 40,
            inheritance: crate::locus::Inheritance::AD,
            mutation_nature: crate::locus::MutationNature::Increase,
            title: "Huntington disease".into(),
        }
        .into_locus(vec![crate::locus::AltRegion {
            chromosome: "chr4".into(),
            start: 5_000_000,
            end: 5_000_060,
        }])
        .unwrap();

        // Genomically distant from the primary window: would have been
        // dropped by the primary skip-window filter if it were applied to
        // alt-merged reads.
        let mut alt_read = spanning_read(&locus, 19, "mismapped1");
        alt_read.reference_start = 5_000_010;
        alt_read.reference_end = 5_000_010 + (alt_read.query_length);
        alt_read.mate_reference_id = Some(0);

        let mut contig_ids = HashMap::new();
        contig_ids.insert("chr4".to_string(), 0);

        let source = FakeReadSource {
            reads: vec![alt_read],
            readlen: 90,
            contig_ids,
            ..Default::default()
        };
        let counts = classify_locus(&locus, &source, 90, false).unwrap();
        assert_eq!(counts.full.get(&19), Some(&1));
    }

    #[test]
    fn unmapped_reads_bypass_the_position_skip_filter() {
        let locus = hd_locus();
        let mut read = spanning_read(&locus, 19, "unmapped1");
        read.is_unmapped = true;
        // Htslib convention: an unmapped read with a mapped mate is stored
        // at the mate's coordinate for indexing, so it lands well inside the
        // (wide) primary fetch window but outside the (narrow) readlen-based
        // skip window classify_locus applies on top of that fetch.
        read.reference_start = locus.start - 500;
        read.reference_end = read.reference_start + read.query_length;

        let source = FakeReadSource {
            reads: vec![read],
            readlen: 90,
            ..Default::default()
        };
        let counts = classify_locus(&locus, &source, 90, false).unwrap();
        assert_eq!(counts.full.get(&19), Some(&1));
    }

    #[test]
    fn classify_read_returns_none_for_junk_sequence() {
        let locus = hd_locus();
        let u_max = ceil_div(90, locus.period()).max(1) as u32;
        let bank = AlignerBank::build(
            locus.prefix.as_bytes(),
            locus.motif.as_bytes(),
            locus.suffix.as_bytes(),
            u_max,
        );
        let junk = b"TTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTT".to_vec();
        assert!(classify_read(&bank, &junk, locus.period(), u_max, false).is_none());
    }

    struct BrokenReadSource;

    impl ReadSource for BrokenReadSource {
        fn fetch(&self, _chromosome: &str, _start: i64, _end: i64) -> anyhow::Result<Vec<Read>> {
            Err(anyhow::anyhow!("index file not found"))
        }
        fn pileup_depth(&self, _chromosome: &str, _position: i64) -> anyhow::Result<u32> {
            Ok(0)
        }
        fn peek_readlen(&self) -> anyhow::Result<usize> {
            Ok(90)
        }
        fn contig_id(&self, _chromosome: &str) -> anyhow::Result<i32> {
            Ok(0)
        }
    }

    #[test]
    fn fetch_failure_surfaces_as_input_unavailable() {
        let locus = hd_locus();
        let err = classify_locus(&locus, &BrokenReadSource, 90, false).unwrap_err();
        assert!(err.downcast_ref::<CoreError>().is_some_and(|e| matches!(e, CoreError::InputUnavailable { .. })));
    }
}
