//! Integrated likelihood caller: the grid search over candidate genotypes
//! that ties the spanning, partial, repeat-only and paired-end
//! sub-likelihoods together into one `call()` entry point.
use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use log::{debug, warn};

use crate::aligner::FLANKMATCH;
use crate::classify::{classify_locus, Counts};
use crate::locus::{Inheritance, Locus, MutationNature};
use crate::pe::{extract_insert_sizes, min_pe_length, InsertSizeSamples};
use crate::pe_likelihood::{self, PeKde};
use crate::readsource::ReadSource;
use crate::result::{GenotypeCall, Label};
use crate::stutter::{self, NoiseModel, StepModel, StutterContext};
use crate::utils::CancellationToken;

const SMALL_VALUE_EXP: f64 = -10.0;
const REALLY_SMALL_VALUE_EXP: f64 = -100.0;

/// Upper bound, in motif units, on how far the grid search extends beyond
/// the observed evidence. Not named in the bundled model files; callers that
/// need a different ceiling (e.g. a locus known to expand far beyond
/// typical ranges) can override it via [`CallerConfig::max_insert_units`].
pub const DEFAULT_MAX_INSERT_UNITS: u32 = 150;

/// Tunable knobs that are genuinely external configuration rather than
/// derived from the locus or the read evidence.
#[derive(Debug, Clone, Copy)]
pub struct CallerConfig {
    /// Switches the REPT aggregator from `max` to `sum` and broadens
    /// `U_local`; also disables pair-of-REPT suppression.
    pub clipped_mode: bool,
    /// Forces both search ranges to the full `{|m|, 2|m|, ..., maxinsert*|m|}`
    /// sweep regardless of observed evidence.
    pub fullsearch: bool,
    pub max_insert_units: u32,
}

impl Default for CallerConfig {
    fn default() -> Self {
        CallerConfig {
            clipped_mode: false,
            fullsearch: false,
            max_insert_units: DEFAULT_MAX_INSERT_UNITS,
        }
    }
}

/// GC fraction of the locus's synthetic reference, used as the fixed `gc`
/// feature fed to the noise model (the model is memoized purely by `h`, so
/// `gc` and `score` must be constants of the call, not per-read values).
fn locus_gc_fraction(locus: &Locus) -> f64 {
    let bases = locus.prefix.bytes().chain(locus.suffix.bytes());
    let mut gc = 0u32;
    let mut total = 0u32;
    for b in bases {
        total += 1;
        if matches!(b, b'G' | b'C' | b'g' | b'c') {
            gc += 1;
        }
    }
    if total == 0 {
        0.5
    } else {
        gc as f64 / total as f64
    }
}

/// A fixed, best-case "score" feature: the stutter model is evaluated once
/// per candidate `h` independent of any one read's actual alignment score.
const ASSUMED_READ_SCORE: f64 = 1.0;

/// Grid-search state and pure-function memoization caches, owned for the
/// lifetime of one `call()` and dropped at its end.
struct IntegratedCaller<'a> {
    locus: &'a Locus,
    step: &'a StepModel,
    noise: &'a NoiseModel,
    readlen: usize,
    period: u32,
    gc: f64,
    half_depth: f64,
    ref_len: i64,
    min_pe_len: i64,
    pe_kde: Option<&'a PeKde>,
    spanning_db: HashMap<u32, Vec<f64>>,
    partial_db: HashMap<u32, Vec<f64>>,
    pe_db: HashMap<u32, Vec<f64>>,
    max_partial_for_clip: u32,
}

impl<'a> IntegratedCaller<'a> {
    fn ctx(&self) -> StutterContext {
        StutterContext {
            gc: self.gc,
            score: ASSUMED_READ_SCORE,
        }
    }

    fn pdf_spanning(&mut self, h: u32) -> &[f64] {
        let period = self.period as usize;
        let ctx = self.ctx();
        self.spanning_db
            .entry(h)
            .or_insert_with(|| stutter::pdf_spanning(self.step, self.noise, period, h, ctx))
    }

    fn pdf_partial(&mut self, h: u32) -> &[f64] {
        let period = self.period as usize;
        let ctx = self.ctx();
        let max_partial = self.max_partial_for_clip;
        self.partial_db
            .entry(h)
            .or_insert_with(|| stutter::pdf_partial(self.step, self.noise, period, h, max_partial, ctx))
    }

    fn pdf_pe(&mut self, h: u32) -> &[f64] {
        let ref_len = self.ref_len;
        let min_pe_len = self.min_pe_len;
        let kde = self.pe_kde;
        self.pe_db.entry(h).or_insert_with(|| {
            kde.map(|k| k.shifted(ref_len, h, min_pe_len))
                .unwrap_or_default()
        })
    }

    /// `alpha` mixing weight between the two alleles' PMFs. `mode` 0 is the
    /// spanning rule, `mode` 1 the partial rule.
    fn alpha(&self, h1: u32, h2: u32, mode: u8) -> f64 {
        let t2 = self.readlen as i64 - 2 * FLANKMATCH as i64;
        let t1 = self.readlen as i64 - FLANKMATCH as i64;
        let (s1, s2) = match mode {
            0 => (
                (t2 - h1 as i64).max(0),
                (t2 - h2 as i64).max(0),
            ),
            _ => ((h1 as i64).min(t1), (h2 as i64).min(t1)),
        };
        if s1 + s2 == 0 {
            0.5
        } else {
            s1 as f64 / (s1 + s2) as f64
        }
    }

    fn evaluate_spanning(&mut self, h1: u32, h2: u32, obs: &BTreeMap<u32, u32>) -> f64 {
        let alpha = self.alpha(h1, h2, 0);
        let p1 = self.pdf_spanning(h1).to_vec();
        let p2 = self.pdf_spanning(h2).to_vec();
        let mut ll = 0.0;
        for (&h, &n) in obs {
            let idx = h as usize;
            let mix = alpha * p1.get(idx).copied().unwrap_or(0.0)
                + (1.0 - alpha) * p2.get(idx).copied().unwrap_or(0.0);
            ll += n as f64 * stutter::safe_log(mix);
        }
        ll
    }

    fn evaluate_partial(&mut self, h1: u32, h2: u32, obs: &BTreeMap<u32, u32>) -> f64 {
        let alpha = self.alpha(h1, h2, 1);
        let p1 = self.pdf_partial(h1).to_vec();
        let p2 = self.pdf_partial(h2).to_vec();
        let mut ll = 0.0;
        for (&h, &n) in obs {
            let idx = h as usize;
            let mix = alpha * p1.get(idx).copied().unwrap_or(0.0)
                + (1.0 - alpha) * p2.get(idx).copied().unwrap_or(0.0);
            ll += n as f64 * stutter::safe_log(mix);
        }
        ll
    }

    fn evaluate_rept(&self, h1: u32, h2: u32, n_rept: u32) -> f64 {
        let readlen = self.readlen as i64;
        let d1 = (h1 as i64 - readlen).max(1) as f64;
        let d2 = (h2 as i64 - readlen).max(1) as f64;
        let mu = (d1 + d2) * self.half_depth / self.readlen as f64;
        poisson_log_pmf(n_rept, mu).max(REALLY_SMALL_VALUE_EXP)
    }

    fn evaluate_pe(&mut self, h1: u32, h2: u32, target_lens: &[i64]) -> f64 {
        let p1 = self.pdf_pe(h1).to_vec();
        let p2 = self.pdf_pe(h2).to_vec();
        if p1.is_empty() || p2.is_empty() {
            return 0.0;
        }
        let mix = pe_likelihood::mixture(&p1, &p2);
        pe_likelihood::log_likelihood(&mix, target_lens)
    }
}

fn poisson_log_pmf(n: u32, mu: f64) -> f64 {
    if mu <= 0.0 {
        return if n == 0 { 0.0 } else { REALLY_SMALL_VALUE_EXP };
    }
    let ln_factorial: f64 = (1..=n).map(|k| (k as f64).ln()).sum();
    n as f64 * mu.ln() - mu - ln_factorial
}

/// Pure entry point: classifies reads, extracts insert sizes, runs the grid
/// search, and produces one immutable [`GenotypeCall`]. Any per-locus
/// failure is caught here and converted to the `Underdetermined` value
/// (`GenotypeCall::undetermined`) rather than propagated, per the error
/// handling design — only truly fatal model-loading failures upstream of
/// this call are real `Err`s.
pub fn call(
    locus: &Locus,
    source: &dyn ReadSource,
    step: &StepModel,
    noise: &NoiseModel,
    is_male: bool,
    config: CallerConfig,
    cancel: &CancellationToken,
) -> Result<GenotypeCall> {
    if cancel.is_cancelled() {
        return Err(crate::error::CoreError::Interrupted.into());
    }

    let readlen = match source.peek_readlen() {
        Ok(rl) if rl > 0 => rl,
        _ => {
            debug!("locus {}: no reads available, reporting undetermined", locus.name);
            return Ok(GenotypeCall::undetermined(&locus.name));
        }
    };

    let counts = match classify_locus(locus, source, readlen, config.clipped_mode) {
        Ok(c) => c,
        Err(e) => {
            warn!("locus {}: classification failed ({e}), reporting undetermined", locus.name);
            return Ok(GenotypeCall::undetermined(&locus.name));
        }
    };

    let pe_samples = extract_insert_sizes(locus, source).unwrap_or_else(|e| {
        debug!("locus {}: PE extraction failed ({e}), continuing without PE evidence", locus.name);
        InsertSizeSamples::default()
    });

    let depth = source
        .pileup_depth(&locus.chromosome, (locus.start + locus.end) / 2)
        .unwrap_or(0) as f64;

    if cancel.is_cancelled() {
        return Err(crate::error::CoreError::Interrupted.into());
    }

    Ok(run_grid_search(locus, &counts, &pe_samples, step, noise, readlen, depth, is_male, config, cancel))
}

fn run_grid_search(
    locus: &Locus,
    counts: &Counts,
    pe_samples: &InsertSizeSamples,
    step: &StepModel,
    noise: &NoiseModel,
    readlen: usize,
    depth: f64,
    is_male: bool,
    config: CallerConfig,
    cancel: &CancellationToken,
) -> GenotypeCall {
    let period = locus.period() as u32;
    let ploidy = locus.effective_ploidy(is_male);

    let obs_spanning: BTreeMap<u32, u32> = counts.full.iter().map(|(&h, &n)| (h * period, n)).collect();
    let obs_partial: BTreeMap<u32, u32> = counts.pref_post.iter().map(|(&h, &n)| (h * period, n)).collect();
    let n_rept: u32 = if config.clipped_mode {
        counts.rept.values().sum()
    } else {
        counts.rept.values().copied().max().unwrap_or(0)
    };

    let max_full = obs_spanning.keys().copied().max().unwrap_or(0);
    let max_partial = obs_partial.keys().copied().max().unwrap_or(0);

    let pe_available = pe_likelihood::is_available(&pe_samples.global_lens, &pe_samples.target_lens);
    let partial_beyond_full = obs_partial
        .keys()
        .filter(|&&h| h > max_full + period)
        .count();
    let pe_mode = pe_available
        && max_partial >= readlen as u32 - 3 * FLANKMATCH as u32
        && partial_beyond_full > 1;

    let pe_kde = if pe_available {
        Some(PeKde::fit(&pe_samples.global_lens))
    } else {
        None
    };

    let mut caller = IntegratedCaller {
        locus,
        step,
        noise,
        readlen,
        period,
        gc: locus_gc_fraction(locus),
        half_depth: depth / 2.0,
        ref_len: locus.end - locus.start,
        min_pe_len: min_pe_length(locus),
        pe_kde: pe_kde.as_ref(),
        spanning_db: HashMap::new(),
        partial_db: HashMap::new(),
        pe_db: HashMap::new(),
        max_partial_for_clip: readlen as u32 - 2 * FLANKMATCH as u32,
    };

    let max_insert_bp = config.max_insert_units * period;

    let mut candidate_set: Vec<u32> = obs_spanning.keys().copied().collect();
    if !obs_partial.is_empty() {
        candidate_set.extend(obs_partial.keys().copied());
        candidate_set.push(max_partial);
    }
    candidate_set.sort_unstable();
    candidate_set.dedup();
    let base_range = candidate_set.clone();

    let mut extended_range = base_range.clone();
    let mut k = 1u32;
    loop {
        let value = max_partial + k * period;
        if value > max_insert_bp {
            break;
        }
        extended_range.push(value);
        k += 1;
    }
    extended_range.sort_unstable();
    extended_range.dedup();

    let (h1_range, h2_range) = if config.fullsearch {
        let full_sweep: Vec<u32> = (1..=config.max_insert_units).map(|u| u * period).collect();
        (full_sweep.clone(), full_sweep)
    } else {
        let h1_range = if !obs_spanning.is_empty() {
            base_range.clone()
        } else {
            extended_range.clone()
        };
        let h2_range = if n_rept > 0 || pe_mode {
            extended_range.clone()
        } else {
            base_range.clone()
        };
        (h1_range, h2_range)
    };

    if h1_range.is_empty() && h2_range.is_empty() {
        return GenotypeCall::undetermined(&locus.name);
    }

    let mut grid: Vec<(u32, u32, f64)> = Vec::new();

    if ploidy == 1 {
        // Haploid loci never consult h2_range: the second column of the
        // grid search simply does not exist for them, matching the original
        // model's `h2range = [h1]` collapse rather than unioning the two.
        for &h in &h1_range {
            if cancel.is_cancelled() {
                return GenotypeCall::undetermined(&locus.name);
            }
            let ll = caller.evaluate_spanning(h, h, &obs_spanning)
                + caller.evaluate_partial(h, h, &obs_partial)
                + caller.evaluate_rept(h, h, n_rept)
                + if pe_mode {
                    caller.evaluate_pe(h, h, &pe_samples.target_lens)
                } else {
                    0.0
                };
            grid.push((h, h, ll));
        }
    } else {
        for &h1 in &h1_range {
            for &h2 in &h2_range {
                if h1 > h2 {
                    continue;
                }
                if cancel.is_cancelled() {
                    return GenotypeCall::undetermined(&locus.name);
                }
                let ll = caller.evaluate_spanning(h1, h2, &obs_spanning)
                    + caller.evaluate_partial(h1, h2, &obs_partial)
                    + caller.evaluate_rept(h1, h2, n_rept)
                    + if pe_mode {
                        caller.evaluate_pe(h1, h2, &pe_samples.target_lens)
                    } else {
                        0.0
                    };
                grid.push((h1, h2, ll));
            }
        }
    }

    if grid.is_empty() {
        return GenotypeCall::undetermined(&locus.name);
    }

    finalize(locus, &grid, counts, pe_samples, period, readlen, pe_mode)
}

/// Picks the MAP estimate, builds marginals/joint/CI/PP/label from the
/// evaluated grid, and assembles the final [`GenotypeCall`].
fn finalize(
    locus: &Locus,
    grid: &[(u32, u32, f64)],
    counts: &Counts,
    pe_samples: &InsertSizeSamples,
    period: u32,
    readlen: usize,
    pe_mode: bool,
) -> GenotypeCall {
    let l_max = grid.iter().map(|&(_, _, l)| l).fold(f64::NEG_INFINITY, f64::max);

    // argmax (L, -h1): highest L, ties broken toward the smallest h1.
    let (&(map_h1, map_h2, _), _) = grid
        .iter()
        .map(|entry| (entry, (entry.2, -(entry.0 as i64))))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
        .unwrap();

    let mut weight_h1: BTreeMap<u32, f64> = BTreeMap::new();
    let mut weight_h2: BTreeMap<u32, f64> = BTreeMap::new();
    let mut weight_joint: BTreeMap<(u32, u32), f64> = BTreeMap::new();
    for &(h1, h2, l) in grid {
        let w = (l - l_max).exp();
        *weight_h1.entry(h1).or_default() += w;
        *weight_h2.entry(h2).or_default() += w;
        *weight_joint.entry((h1, h2)).or_default() += w;
    }

    let p_h1 = normalize_sparsify_to_units(&weight_h1, period);
    let p_h2 = normalize_sparsify_to_units(&weight_h2, period);
    let p_h1h2 = normalize_sparsify_joint(&weight_joint, period);

    let ci1 = credible_interval(&p_h1, map_h1 / period);
    let ci2 = credible_interval(&p_h2, map_h2 / period);

    let pp = pathology_probability(locus, grid, l_max, period);
    let label = classify_label(locus, map_h1 / period, map_h2 / period, pp);

    let fdp: u32 = counts.full.values().sum();
    let pdp: u32 = counts.pref_post.values().sum();
    let rdp: u32 = counts.rept.values().sum();
    let pedp = pe_samples.target_lens.len() as u32;

    GenotypeCall {
        locus_name: locus.name.clone(),
        alleles: ((map_h1 / period) as i32, (map_h2 / period) as i32),
        fdp,
        pdp,
        rdp,
        pedp,
        peg: GenotypeCall::format_insert_summary(&pe_samples.global_lens),
        pet: if pe_mode {
            GenotypeCall::format_insert_summary(&pe_samples.target_lens)
        } else {
            None
        },
        ci: Some((ci1.0 as i32, ci1.1 as i32, ci2.0 as i32, ci2.1 as i32)),
        pp,
        p_h1,
        p_h2,
        p_h1h2,
        label,
    }
}

fn normalize_sparsify_to_units(weights: &BTreeMap<u32, f64>, period: u32) -> BTreeMap<u32, f64> {
    let total: f64 = weights.values().sum();
    let floor = SMALL_VALUE_EXP.exp();
    let mut by_unit: BTreeMap<u32, f64> = BTreeMap::new();
    if total <= 0.0 {
        return by_unit;
    }
    for (&h, &w) in weights {
        let p = w / total;
        if p < floor {
            continue;
        }
        *by_unit.entry(h / period).or_default() += p;
    }
    let renorm: f64 = by_unit.values().sum();
    if renorm > 0.0 {
        for v in by_unit.values_mut() {
            *v /= renorm;
        }
    }
    by_unit
}

fn normalize_sparsify_joint(
    weights: &BTreeMap<(u32, u32), f64>,
    period: u32,
) -> BTreeMap<(u32, u32), f64> {
    let total: f64 = weights.values().sum();
    let floor = SMALL_VALUE_EXP.exp();
    let mut by_unit: BTreeMap<(u32, u32), f64> = BTreeMap::new();
    if total <= 0.0 {
        return by_unit;
    }
    for (&(h1, h2), &w) in weights {
        let p = w / total;
        if p < floor {
            continue;
        }
        *by_unit.entry((h1 / period, h2 / period)).or_default() += p;
    }
    let renorm: f64 = by_unit.values().sum();
    if renorm > 0.0 {
        for v in by_unit.values_mut() {
            *v /= renorm;
        }
    }
    by_unit
}

/// 95% credible interval: lower is the smallest key whose cumulative mass
/// exceeds 2.5%, upper the smallest key whose cumulative mass exceeds 97.5%.
fn credible_interval(pmf: &BTreeMap<u32, f64>, map_unit: u32) -> (u32, u32) {
    if pmf.is_empty() {
        return (map_unit, map_unit);
    }
    let total: f64 = pmf.values().sum();
    let mut cum = 0.0;
    let mut lo = None;
    let mut hi = None;
    for (&k, &p) in pmf {
        cum += p;
        if lo.is_none() && cum > 0.025 * total {
            lo = Some(k);
        }
        if hi.is_none() && cum > 0.975 * total {
            hi = Some(k);
        }
    }
    (
        lo.unwrap_or(map_unit),
        hi.unwrap_or_else(|| *pmf.keys().last().unwrap()),
    )
}

fn pathology_predicate(locus: &Locus, h1_units: u32, h2_units: u32) -> bool {
    let (lo, hi) = (h1_units.min(h2_units), h1_units.max(h2_units));
    let cutoff = locus.cutoff_risk;
    match (locus.mutation_nature, locus.inheritance.is_recessive()) {
        (MutationNature::Increase, false) => hi >= cutoff,
        (MutationNature::Increase, true) => lo >= cutoff,
        (MutationNature::Decrease, false) => lo <= cutoff,
        (MutationNature::Decrease, true) => hi <= cutoff,
    }
}

fn pathology_probability(locus: &Locus, grid: &[(u32, u32, f64)], l_max: f64, period: u32) -> f64 {
    let mut pathological = 0.0;
    let mut all = 0.0;
    for &(h1, h2, l) in grid {
        let w = (l - l_max).exp();
        all += w;
        if pathology_predicate(locus, h1 / period, h2 / period) {
            pathological += w;
        }
    }
    if all <= 0.0 {
        return -1.0;
    }
    (pathological / all).min(1.0)
}

/// Critical allele for labeling: the maximum allele for dominant/increase
/// loci (and decrease/recessive), the minimum for recessive/increase (and
/// decrease/dominant) — the same swap rule [`pathology_predicate`] encodes.
fn critical_allele(locus: &Locus, h1_units: u32, h2_units: u32) -> u32 {
    let (lo, hi) = (h1_units.min(h2_units), h1_units.max(h2_units));
    match (locus.mutation_nature, locus.inheritance.is_recessive()) {
        (MutationNature::Increase, false) => hi,
        (MutationNature::Increase, true) => lo,
        (MutationNature::Decrease, false) => lo,
        (MutationNature::Decrease, true) => hi,
    }
}

fn classify_label(locus: &Locus, h1_units: u32, h2_units: u32, pp: f64) -> Label {
    if pp < 0.0 {
        return Label::Missing;
    }
    let crit = critical_allele(locus, h1_units, h2_units);
    let crosses_risk = match locus.mutation_nature {
        MutationNature::Increase => crit >= locus.cutoff_risk,
        MutationNature::Decrease => crit <= locus.cutoff_risk,
    };
    let crosses_prerisk = match locus.mutation_nature {
        MutationNature::Increase => crit >= locus.cutoff_prerisk,
        MutationNature::Decrease => crit <= locus.cutoff_prerisk,
    };
    if crosses_risk {
        Label::Risk
    } else if crosses_prerisk {
        Label::Prerisk
    } else {
        Label::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locus::LocusRecord;
    use crate::readsource::test_support::FakeReadSource;
    use crate::readsource::Read;

    fn hd_locus() -> Locus {
        LocusRecord {
            name: "HD".into(),
            repeat: "CAG".into(),
            repeat_location: "chr4:3074877-3074933".into(),
            prefix: "CACTTCCTGGTCAGCGCA".into(),
            suffix: "CAGCCGCCAGGGCCCTCA".into(),
            cutoff_prerisk: 36,
            cutoff_risk: 40,
            inheritance: Inheritance::AD,
            mutation_nature: MutationNature::Increase,
            title: "Huntington disease".into(),
        }
        .into_locus(vec![])
        .unwrap()
    }

    fn fixture_step_model() -> StepModel {
        StepModel {
            non_unit_step: [0.12, 0.11, 0.10, 0.09, 0.08, 0.07],
            prob_increase: 0.55,
            step_size_pmf: [
                vec![0.010, 0.050, 0.250, 0.000, 0.250, 0.050, 0.010],
                vec![0.008, 0.040, 0.220, 0.000, 0.220, 0.040, 0.008],
                vec![0.006, 0.035, 0.200, 0.000, 0.200, 0.035, 0.006],
                vec![0.005, 0.030, 0.180, 0.000, 0.180, 0.030, 0.005],
                vec![0.004, 0.025, 0.150, 0.000, 0.150, 0.025, 0.004],
                vec![0.003, 0.020, 0.120, 0.000, 0.120, 0.020, 0.003],
            ],
        }
    }

    fn fixture_noise_model() -> NoiseModel {
        NoiseModel {
            weights: vec![-3.0, 0.02, -0.01, 1.5, 0.3],
        }
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
    fn homozygous_reference_calls_19_19_ok() {
        let locus = hd_locus();
        let reads: Vec<Read> = (0..20)
            .map(|i| spanning_read(&locus, 19, &format!("r{i}")))
            .collect();
        let mut depth_by_position = std::collections::HashMap::new();
        depth_by_position.insert((locus.chromosome.clone(), (locus.start + locus.end) / 2), 40u32);
        let source = FakeReadSource {
            reads,
            readlen: 90,
            depth_by_position,
            ..Default::default()
        };
        let step = fixture_step_model();
        let noise = fixture_noise_model();
        let cancel = CancellationToken::new();
        let call_result = call(&locus, &source, &step, &noise, false, CallerConfig::default(), &cancel).unwrap();

        assert_eq!(call_result.alleles, (19, 19));
        assert_eq!(call_result.label, Label::Ok);
        assert!(call_result.pp < 0.1);
        assert!(call_result.alleles.0 <= call_result.alleles.1);
    }

    #[test]
    fn no_reads_is_undetermined() {
        let locus = hd_locus();
        let source = FakeReadSource {
            readlen: 0,
            ..Default::default()
        };
        let step = fixture_step_model();
        let noise = fixture_noise_model();
        let cancel = CancellationToken::new();
        let call_result = call(&locus, &source, &step, &noise, false, CallerConfig::default(), &cancel).unwrap();
        assert_eq!(call_result.alleles, (-1, -1));
        assert_eq!(call_result.label, Label::Missing);
        assert_eq!(call_result.pp, -1.0);
    }

    #[test]
    fn ploidy_one_forces_equal_alleles() {
        let mut locus = hd_locus();
        locus.inheritance = Inheritance::XR;
        let reads: Vec<Read> = (0..20)
            .map(|i| spanning_read(&locus, 24, &format!("r{i}")))
            .collect();
        let mut depth_by_position = std::collections::HashMap::new();
        depth_by_position.insert((locus.chromosome.clone(), (locus.start + locus.end) / 2), 40u32);
        let source = FakeReadSource {
            reads,
            readlen: 90,
            depth_by_position,
            ..Default::default()
        };
        let step = fixture_step_model();
        let noise = fixture_noise_model();
        let cancel = CancellationToken::new();
        let call_result = call(&locus, &source, &step, &noise, true, CallerConfig::default(), &cancel).unwrap();
        assert_eq!(call_result.alleles.0, call_result.alleles.1);
    }

    #[test]
    fn poisson_log_pmf_peaks_at_mean() {
        let at_mean = poisson_log_pmf(5, 5.0);
        let away = poisson_log_pmf(20, 5.0);
        assert!(at_mean > away);
    }

    #[test]
    fn decrease_recessive_label_law() {
        let mut locus = hd_locus();
        locus.mutation_nature = MutationNature::Decrease;
        locus.inheritance = Inheritance::AR;
        locus.cutoff_risk = 10;
        assert_eq!(classify_label(&locus, 30, 40, 0.0), Label::Ok);
        assert_eq!(classify_label(&locus, 5, 5, 0.9), Label::Risk);
    }
}
