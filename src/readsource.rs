//! External read-source interface.
//!
//! The core algorithm never talks to a BAM/CRAM file directly; it only ever
//! sees whatever implements [`ReadSource`]. The real implementation (backed
//! by `rust-htslib`) lives at the driver boundary in `bin/tredcall.rs`, and
//! tests exercise the core against an in-memory double instead, keeping the
//! classifier and caller free of any htslib dependency.
use anyhow::Result;

/// A single sequenced read (or one mate of a pair) relevant to a locus
/// window. Coordinates are 0-based, matching the rest of the crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    pub name: String,
    pub sequence: Vec<u8>,
    /// True if this read is the reverse-strand mate of its pair.
    pub is_reverse: bool,
    /// True for first-in-pair, false for second-in-pair or unpaired.
    pub is_first_in_pair: bool,
    /// Leftmost reference position of the alignment, 0-based.
    pub reference_start: i64,
    /// One past the rightmost reference position consumed by the alignment.
    pub reference_end: i64,
    /// Start of the aligned (non-soft-clipped) portion of the read, 0-based
    /// offset into `sequence`.
    pub query_alignment_start: i64,
    /// One past the end of the aligned portion of the read.
    pub query_alignment_end: i64,
    /// Full read length, including any soft-clipped bases.
    pub query_length: i64,
    /// Reference id (tid) of this read's mate, or `None` if unpaired/unmapped.
    pub mate_reference_id: Option<i32>,
    /// Leftmost reference position of the mate, 0-based, or `None`.
    pub mate_reference_start: Option<i64>,
    /// Observed template length (signed, as in column 9 of SAM).
    pub template_length: i64,
    pub is_paired: bool,
    pub is_unmapped: bool,
    pub is_duplicate: bool,
    pub is_supplementary: bool,
    pub is_secondary: bool,
    pub mapping_quality: u8,
}

impl Read {
    /// Bases soft-clipped off the left end of the read.
    pub fn left_softclip(&self) -> i64 {
        self.query_alignment_start
    }

    /// Bases soft-clipped off the right end of the read.
    pub fn right_softclip(&self) -> i64 {
        self.query_length - self.query_alignment_end
    }
}

impl Read {
    /// Reads that should never be used as evidence, regardless of locus:
    /// PCR/optical duplicates, supplementary and secondary alignments. This
    /// mirrors the filter applied before any classification is attempted
    /// upstream of this crate's direct ancestor.
    pub fn is_usable(&self) -> bool {
        !self.is_duplicate && !self.is_supplementary && !self.is_secondary
    }
}

/// Everything the core needs from an alignment source, kept deliberately
/// narrow so a test double can implement it without touching htslib.
pub trait ReadSource {
    /// All usable reads overlapping `[start, end)` on `chromosome`.
    fn fetch(&self, chromosome: &str, start: i64, end: i64) -> Result<Vec<Read>>;

    /// Read depth at a single point position, for the Y-chromosome depth
    /// probe and for the locus coverage precheck.
    fn pileup_depth(&self, chromosome: &str, position: i64) -> Result<u32>;

    /// A representative read length for this source, used to size the
    /// spanning/partial PMF grids. Implementations typically sample a
    /// handful of reads near the start of the reference and return the
    /// modal or first observed length.
    fn peek_readlen(&self) -> Result<usize>;

    /// Reference id (tid) for a chromosome name, used to confirm a mate maps
    /// inside the primary locus window when merging alt-region evidence.
    /// Not part of the original three-method interface but needed in
    /// practice: without it, alt-region mate matching would have to re-parse
    /// chromosome name strings read-by-read instead of comparing integers.
    fn contig_id(&self, chromosome: &str) -> Result<i32>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;

    /// In-memory [`ReadSource`] double used by unit and integration tests.
    #[derive(Debug, Default)]
    pub struct FakeReadSource {
        pub reads: Vec<Read>,
        pub depth_by_position: HashMap<(String, i64), u32>,
        pub readlen: usize,
        pub contig_ids: HashMap<String, i32>,
    }

    impl ReadSource for FakeReadSource {
        fn fetch(&self, _chromosome: &str, start: i64, end: i64) -> Result<Vec<Read>> {
            Ok(self
                .reads
                .iter()
                .filter(|r| r.is_usable())
                .filter(|r| r.reference_start < end && r.reference_end > start)
                .cloned()
                .collect())
        }

        fn pileup_depth(&self, chromosome: &str, position: i64) -> Result<u32> {
            Ok(*self
                .depth_by_position
                .get(&(chromosome.to_string(), position))
                .unwrap_or(&0))
        }

        fn peek_readlen(&self) -> Result<usize> {
            Ok(self.readlen)
        }

        fn contig_id(&self, chromosome: &str) -> Result<i32> {
            self.contig_ids
                .get(chromosome)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unknown contig {chromosome}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_read() -> Read {
        Read {
            name: "r1".into(),
            sequence: b"ACGT".to_vec(),
            is_reverse: false,
            is_first_in_pair: true,
            reference_start: 0,
            reference_end: 4,
            query_alignment_start: 0,
            query_alignment_end: 4,
            query_length: 4,
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
    fn duplicate_reads_are_not_usable() {
        let mut r = base_read();
        r.is_duplicate = true;
        assert!(!r.is_usable());
    }

    #[test]
    fn plain_primary_read_is_usable() {
        assert!(base_read().is_usable());
    }
}
