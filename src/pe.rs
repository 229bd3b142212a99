//! Paired-end insert-size extractor.
use std::collections::HashMap;

use anyhow::Result;

use crate::aligner::FLANKMATCH;
use crate::error::CoreError;
use crate::locus::Locus;
use crate::readsource::{Read, ReadSource};

/// Global cap on the indexing domain for insert sizes and PMFs.
pub const SPAN: i64 = 1000;

/// Minimum PE fragment length implied by the locus geometry; used by the PE
/// likelihood model as a floor below which the locus-conditional PMF is
/// forced to zero mass.
pub fn min_pe_length(locus: &Locus) -> i64 {
    (locus.end - locus.start) + 2 * FLANKMATCH as i64 + 2
}

/// Insert-size samples collected over a locus's wide window, split into the
/// unconditional ("global") and target-spanning subsets.
#[derive(Debug, Default, Clone)]
pub struct InsertSizeSamples {
    pub global_lens: Vec<i64>,
    pub target_lens: Vec<i64>,
}

/// Soft-clip-corrected template length between a forward-strand read and its
/// reverse-strand mate: the raw reference span widened by whatever was
/// clipped off the outer (5′ of `first`, 3′ of `mate`) ends, since those
/// clipped bases would have extended the true fragment.
fn corrected_insert_size(first: &Read, mate: &Read) -> i64 {
    let raw = mate.reference_end - first.reference_start;
    raw + first.left_softclip() + mate.right_softclip()
}

/// Scans paired, mapped, non-duplicate reads over `[locus.start - 10*SPAN,
/// locus.end + 10*SPAN]`, pairs them by read id, and splits the surviving
/// pairs into global and target-spanning insert-size samples.
pub fn extract_insert_sizes(locus: &Locus, source: &dyn ReadSource) -> Result<InsertSizeSamples> {
    let window_start = locus.start - 10 * SPAN;
    let window_end = locus.end + 10 * SPAN;
    let reads = source
        .fetch(&locus.chromosome, window_start, window_end)
        .map_err(|e| CoreError::InputUnavailable {
            chromosome: locus.chromosome.clone(),
            start: window_start,
            end: window_end,
            reason: e.to_string(),
        })?;

    let mut by_id: HashMap<String, Vec<Read>> = HashMap::new();
    for read in reads {
        if !read.is_usable() || !read.is_paired || read.is_unmapped {
            continue;
        }
        by_id.entry(read.name.clone()).or_default().push(read);
    }

    let mut samples = InsertSizeSamples::default();
    for mut group in by_id.into_values() {
        if group.len() < 2 {
            continue;
        }
        group.truncate(2);
        group.sort_by_key(|r| r.reference_start);
        let (first, mate) = (&group[0], &group[1]);

        // Conventional FR orientation: the leftmost mate forward, the
        // rightmost mate reverse.
        if first.is_reverse || !mate.is_reverse {
            continue;
        }

        let t = corrected_insert_size(first, mate);
        if t >= SPAN {
            continue;
        }

        let is_target_spanning = first.reference_start < locus.start - FLANKMATCH as i64
            && mate.reference_end > locus.end + FLANKMATCH as i64;

        if is_target_spanning {
            samples.target_lens.push(t);
        } else {
            samples.global_lens.push(t);
        }
    }

    Ok(samples)
}
