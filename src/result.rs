//! Terminal, immutable per-sample genotype call record.
use std::collections::BTreeMap;

use crate::utils::mean_std;

/// Disease-risk label derived from the called genotype against the locus's
/// cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Ok,
    Prerisk,
    Risk,
    Missing,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Ok => "ok",
            Label::Prerisk => "prerisk",
            Label::Risk => "risk",
            Label::Missing => "missing",
        }
    }
}

/// A sparse, normalized distribution over motif-unit repeat counts, dropping
/// any mass below the model's numerical floor.
pub type SparsePmf = BTreeMap<u32, f64>;

/// Terminal output of one locus call: immutable, produced once by
/// [`crate::caller::call`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct GenotypeCall {
    pub locus_name: String,
    /// `(h1, h2)` with `h1 <= h2`, or `(-1, -1)` when undetermined.
    pub alleles: (i32, i32),
    /// Total FULL/PREF+POST/REPT/target-spanning-pair depths.
    pub fdp: u32,
    pub pdp: u32,
    pub rdp: u32,
    pub pedp: u32,
    /// `"mean+/-std bp"` summaries of the global and target insert-size
    /// distributions.
    pub peg: Option<String>,
    pub pet: Option<String>,
    /// `(h1_lo, h1_hi, h2_lo, h2_hi)` 95% marginal credible interval, absent
    /// when undetermined.
    pub ci: Option<(i32, i32, i32, i32)>,
    /// Posterior pathology probability, or -1 when undetermined.
    pub pp: f64,
    pub p_h1: SparsePmf,
    pub p_h2: SparsePmf,
    pub p_h1h2: BTreeMap<(u32, u32), f64>,
    pub label: Label,
}

impl GenotypeCall {
    /// The "undetermined" terminal value: no candidate alleles survived grid
    /// construction. This is a value, never an error — downstream consumers
    /// branch on `label == Missing`, not on a `Result::Err`.
    pub fn undetermined(locus_name: impl Into<String>) -> Self {
        GenotypeCall {
            locus_name: locus_name.into(),
            alleles: (-1, -1),
            fdp: 0,
            pdp: 0,
            rdp: 0,
            pedp: 0,
            peg: None,
            pet: None,
            ci: None,
            pp: -1.0,
            p_h1: SparsePmf::new(),
            p_h2: SparsePmf::new(),
            p_h1h2: BTreeMap::new(),
            label: Label::Missing,
        }
    }

    /// Formats `PEG`/`PET` from raw samples, matching the bundled
    /// `mean+/-std bp` convention.
    pub fn format_insert_summary(samples: &[i64]) -> Option<String> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
        let var = samples.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;
        Some(mean_std(mean, var.sqrt()))
    }

    /// `h1|n1;h2|n2;...` encoding of a `tag` count histogram, sorted by `h`.
    pub fn format_histogram(counts: &std::collections::HashMap<u32, u32>) -> String {
        let mut entries: Vec<(u32, u32)> = counts.iter().map(|(&h, &n)| (h, n)).collect();
        entries.sort_by_key(|(h, _)| *h);
        entries
            .iter()
            .map(|(h, n)| format!("{h}|{n}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// `h1_lo-h1_hi|h2_lo-h2_hi` encoding of the credible interval, in motif
    /// units.
    pub fn format_ci(&self) -> Option<String> {
        self.ci
            .map(|(lo1, hi1, lo2, hi2)| format!("{lo1}-{hi1}|{lo2}-{hi2}"))
    }
}
