//! Locus metadata: the static description of a tandem repeat disease locus,
//! loaded from the bundled `TREDs.meta.csv` resource (see [`crate::metadata`]).
use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Mode of inheritance for a TRED locus, as carried in `TREDs.meta.csv`.
///
/// `GCN` ("generic copy number") loci have no disease association and are
/// used purely as copy-number controls; [`Inheritance::is_xlinked`] and
/// [`Inheritance::is_recessive`] are plain predicates over the six-way
/// enum rather than stored booleans, so a reader never has to wonder
/// whether the flag and the variant can disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Inheritance {
    AD,
    AR,
    XD,
    XR,
    XL,
    GCN,
}

impl Inheritance {
    pub fn is_xlinked(&self) -> bool {
        matches!(self, Inheritance::XD | Inheritance::XR | Inheritance::XL)
    }

    pub fn is_recessive(&self) -> bool {
        matches!(self, Inheritance::AR | Inheritance::XR)
    }
}

/// Direction in which repeat expansion produces pathology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationNature {
    Increase,
    Decrease,
}

/// A secondary region whose read evidence should be folded into the primary
/// locus window (e.g. a processed pseudogene copy of the repeat elsewhere in
/// the genome that otherwise recruits misplaced reads).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltRegion {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
}

/// Static metadata for one tandem repeat disease locus.
#[derive(Debug, Clone, PartialEq)]
pub struct Locus {
    pub name: String,
    pub motif: String,
    pub chromosome: String,
    /// 0-based, half-open like the rest of the crate's coordinates.
    pub start: i64,
    pub end: i64,
    pub prefix: String,
    pub suffix: String,
    pub cutoff_prerisk: u32,
    pub cutoff_risk: u32,
    pub inheritance: Inheritance,
    pub mutation_nature: MutationNature,
    pub title: String,
    pub alt_regions: Vec<AltRegion>,
}

impl Locus {
    /// Repeat unit length in bases.
    pub fn period(&self) -> usize {
        self.motif.len()
    }

    /// Reference copy number, derived from the reference window length.
    ///
    /// The window length must be an exact multiple of the motif length;
    /// a locus that fails this invariant cannot have been constructed by
    /// [`crate::metadata::load_loci`], which checks it at load time.
    pub fn ref_copy(&self) -> Result<u32> {
        let len = self.end - self.start;
        if len <= 0 || len % self.period() as i64 != 0 {
            bail!(
                "locus {} reference window length {} is not a positive multiple of period {}",
                self.name,
                len,
                self.period()
            );
        }
        Ok((len / self.period() as i64) as u32)
    }

    /// Number of haplotypes to report for this locus: 1 on an X-linked locus
    /// in a male sample, 2 otherwise.
    pub fn effective_ploidy(&self, is_male: bool) -> usize {
        if self.inheritance.is_xlinked() && is_male {
            1
        } else {
            2
        }
    }
}

/// Raw row shape of `TREDs.meta.csv`, matched 1:1 against the bundled file's
/// header before being resolved into a [`Locus`].
#[derive(Debug, Deserialize)]
pub(crate) struct LocusRecord {
    pub name: String,
    pub repeat: String,
    pub repeat_location: String,
    pub prefix: String,
    pub suffix: String,
    pub cutoff_prerisk: u32,
    pub cutoff_risk: u32,
    pub inheritance: Inheritance,
    pub mutation_nature: MutationNature,
    pub title: String,
}

impl LocusRecord {
    /// Parses `repeat_location` of the form `chr:start-end` (1-based,
    /// inclusive, as written by hand in the metadata table) into 0-based
    /// half-open coordinates.
    pub(crate) fn into_locus(self, alt_regions: Vec<AltRegion>) -> Result<Locus> {
        let (chrom, range) = self
            .repeat_location
            .split_once(':')
            .with_context(|| format!("malformed repeat_location for {}", self.name))?;
        let (start_s, end_s) = range
            .split_once('-')
            .with_context(|| format!("malformed repeat_location for {}", self.name))?;
        let start_1based: i64 = start_s
            .parse()
            .with_context(|| format!("bad start coordinate for {}", self.name))?;
        let end_1based: i64 = end_s
            .parse()
            .with_context(|| format!("bad end coordinate for {}", self.name))?;

        let locus = Locus {
            name: self.name,
            motif: self.repeat,
            chromosome: chrom.to_string(),
            start: start_1based - 1,
            end: end_1based,
            prefix: self.prefix,
            suffix: self.suffix,
            cutoff_prerisk: self.cutoff_prerisk,
            cutoff_risk: self.cutoff_risk,
            inheritance: self.inheritance,
            mutation_nature: self.mutation_nature,
            title: self.title,
            alt_regions,
        };
        // Force the divisibility invariant to be checked at load time rather
        // than on first use deep inside a caller.
        locus.ref_copy()?;
        Ok(locus)
    }
}
