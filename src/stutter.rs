//! Stutter model: period-indexed step-size PMF, logistic per-read noise
//! model, and the spanning/partial PMFs built from them.
use std::io::BufRead;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::error::CoreError;
use crate::pe::SPAN;

pub const MAX_PERIOD: usize = 6;
const SMALL_VALUE: f64 = std::f64::consts::E.powf(-10.0);

/// Step-size PMF and noise model, loaded once per process from the two
/// bundled text resources and shared read-only across callers.
#[derive(Debug, Clone)]
pub struct StepModel {
    /// `P_non_unit_step[p]` for `p = 1..=MAX_PERIOD`; carried for parity with
    /// the bundled file but not consumed by the spanning/partial PMFs.
    pub non_unit_step: [f64; MAX_PERIOD],
    /// Carried but unused, see module docs.
    pub prob_increase: f64,
    /// `step_size_pmf[p]`, a symmetric vector of step-deviation
    /// probabilities in motif-unit steps, for `p = 1..=MAX_PERIOD`.
    pub step_size_pmf: [Vec<f64>; MAX_PERIOD],
}

impl StepModel {
    /// Loads the bundled step-size PMF resource, wrapping any failure as
    /// [`CoreError::ModelDataMissing`] since a caller can't be constructed
    /// without it.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_inner(path).map_err(|e| CoreError::ModelDataMissing(format!("{}: {e}", path.display())).into())
    }

    fn load_inner(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening step model file {}", path.display()))?;
        let mut lines = std::io::BufReader::new(file).lines();

        let mut non_unit_step = [0.0f64; MAX_PERIOD];
        for slot in non_unit_step.iter_mut() {
            let line = next_line(&mut lines, path)?;
            *slot = line
                .trim()
                .parse()
                .with_context(|| format!("bad non_unit_step value in {}", path.display()))?;
        }

        let increase_line = next_line(&mut lines, path)?;
        let prob_increase = increase_line
            .split('=')
            .nth(1)
            .ok_or_else(|| anyhow!("malformed prob_increase line in {}", path.display()))?
            .trim()
            .parse()
            .with_context(|| format!("bad prob_increase value in {}", path.display()))?;

        let mut step_size_pmf: [Vec<f64>; MAX_PERIOD] = Default::default();
        for slot in step_size_pmf.iter_mut() {
            let line = next_line(&mut lines, path)?;
            let values: Vec<f64> = line
                .split_whitespace()
                .skip(1) // leading label column, e.g. "p3"
                .map(|v| v.parse::<f64>())
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("bad step_size_pmf row in {}", path.display()))?;
            *slot = values;
        }

        Ok(StepModel {
            non_unit_step,
            prob_increase,
            step_size_pmf,
        })
    }

    /// Returns the step-size PMF row for period `p`, reusing the `p = 6` row
    /// for any period greater than [`MAX_PERIOD`].
    pub fn step_size_pmf_for(&self, period: usize) -> &[f64] {
        let idx = period.clamp(1, MAX_PERIOD) - 1;
        &self.step_size_pmf[idx]
    }
}

fn next_line(lines: &mut std::io::Lines<std::io::BufReader<std::fs::File>>, path: &Path) -> Result<String> {
    lines
        .next()
        .ok_or_else(|| anyhow!("unexpected end of file {}", path.display()))?
        .with_context(|| format!("reading line from {}", path.display()))
}

/// Logistic regression predicting the per-read stutter probability from
/// `(period, h/period, gc, score)`.
#[derive(Debug, Clone)]
pub struct NoiseModel {
    /// `weights[0]` is the intercept; the rest pair positionally with the
    /// feature vector passed to [`NoiseModel::predict`].
    pub weights: Vec<f64>,
}

impl NoiseModel {
    /// Loads the bundled noise-model weights, wrapping any failure as
    /// [`CoreError::ModelDataMissing`] since a caller can't be constructed
    /// without it.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_inner(path).map_err(|e| CoreError::ModelDataMissing(format!("{}: {e}", path.display())).into())
    }

    fn load_inner(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("opening noise model file {}", path.display()))?;
        let weights: Vec<f64> = text
            .lines()
            .filter(|l| !l.trim_start().starts_with('#') && !l.trim().is_empty())
            .map(|l| l.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("bad weight value in {}", path.display()))?;
        if weights.is_empty() {
            return Err(anyhow!("no weights found in {}", path.display()));
        }
        Ok(NoiseModel { weights })
    }

    /// `sigma(w0 + w . x)` for feature vector `x = (period, h/period, gc,
    /// score)`.
    pub fn predict(&self, features: [f64; 4]) -> f64 {
        let mut z = self.weights[0];
        for (w, x) in self.weights[1..].iter().zip(features.iter()) {
            z += w * x;
        }
        1.0 / (1.0 + (-z).exp())
    }
}

/// Per-read features the [`NoiseModel`] conditions on, beyond the period and
/// implied repeat count which the caller already has in hand.
#[derive(Debug, Clone, Copy)]
pub struct StutterContext {
    pub gc: f64,
    pub score: f64,
}

/// Builds the length-[`SPAN`] spanning PMF for repeat count `h`, centered at
/// index `h`, clipped to `[0, SPAN)`.
pub fn pdf_spanning(
    step: &StepModel,
    noise: &NoiseModel,
    period: usize,
    h: u32,
    ctx: StutterContext,
) -> Vec<f64> {
    let q = noise.predict([period as f64, h as f64 / period as f64, ctx.gc, ctx.score]);
    let row = step.step_size_pmf_for(period);
    let mut v: Vec<f64> = row.iter().map(|p| p * q).collect();
    let center = v.len() / 2;
    if !v.is_empty() {
        v[center] = 1.0 - q;
    }

    let mut pdf = vec![0.0; SPAN as usize];
    let offset = h as i64 - center as i64;
    for (i, mass) in v.iter().enumerate() {
        let idx = offset + i as i64;
        if idx >= 0 && idx < SPAN {
            pdf[idx as usize] += mass;
        }
    }
    pdf
}

/// Derives the partial-read PMF for repeat count `h` from the spanning PMF
/// via uniform truncation, clipping `h` to `max_partial = readlen -
/// 2*FLANKMATCH` and adding the full spanning-PMF mass for the clipped value
/// back in, elementwise, scaled by the same uniform weight `c`.
pub fn pdf_partial(
    step: &StepModel,
    noise: &NoiseModel,
    period: usize,
    h: u32,
    max_partial: u32,
    ctx: StutterContext,
) -> Vec<f64> {
    let h_prime = h.min(max_partial);
    let c = 1.0 / (h_prime as f64 + 1.0);

    let mut pdf = vec![0.0; SPAN as usize];
    for idx in 0..h_prime.min(SPAN as u32) {
        pdf[idx as usize] = c;
    }

    let spanning = pdf_spanning(step, noise, period, h_prime, ctx);
    for (p, s) in pdf.iter_mut().zip(spanning.iter()) {
        *p += c * s;
    }
    pdf
}

/// Floors a probability at [`SMALL_VALUE`] before taking its log, matching
/// the "never take log(0)" guard used throughout the caller.
pub fn safe_log(p: f64) -> f64 {
    p.max(SMALL_VALUE).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture_stepmodel() -> tempfile_free::TempFile {
        let content = "0.12\n0.11\n0.10\n0.09\n0.08\n0.07\nprob_increase = 0.55\n\
p1\t0.010\t0.050\t0.250\t0.000\t0.250\t0.050\t0.010\n\
p2\t0.008\t0.040\t0.220\t0.000\t0.220\t0.040\t0.008\n\
p3\t0.006\t0.035\t0.200\t0.000\t0.200\t0.035\t0.006\n\
p4\t0.005\t0.030\t0.180\t0.000\t0.180\t0.030\t0.005\n\
p5\t0.004\t0.025\t0.150\t0.000\t0.150\t0.025\t0.004\n\
p6\t0.003\t0.020\t0.120\t0.000\t0.120\t0.020\t0.003\n";
        tempfile_free::TempFile::new(content)
    }

    fn write_fixture_stuttermodel() -> tempfile_free::TempFile {
        let content = "# header\n# header\n# header\n# header\n# header\n# header\n-3.0\n0.02\n-0.01\n1.5\n0.3\n";
        tempfile_free::TempFile::new(content)
    }

    mod tempfile_free {
        use std::io::Write;
        use std::path::PathBuf;

        /// Minimal scratch-file helper so stutter model tests don't need a
        /// `tempfile` dev-dependency just to write two lines of fixture data.
        pub struct TempFile {
            path: PathBuf,
        }

        impl TempFile {
            pub fn new(content: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("tredcall-test-{}-{}.txt", std::process::id(), fastrand_stub()));
                let mut f = std::fs::File::create(&path).unwrap();
                f.write_all(content.as_bytes()).unwrap();
                TempFile { path }
            }

            pub fn path(&self) -> &std::path::Path {
                &self.path
            }
        }

        impl Drop for TempFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }

        fn fastrand_stub() -> u64 {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .subsec_nanos() as u64
        }
    }

    #[test]
    fn step_model_loads_and_reuses_p6_beyond_max_period() {
        let f = write_fixture_stepmodel();
        let step = StepModel::load(f.path()).unwrap();
        assert_eq!(step.prob_increase, 0.55);
        assert_eq!(step.step_size_pmf_for(6), step.step_size_pmf_for(12));
        assert_eq!(step.step_size_pmf_for(3).len(), 7);
    }

    #[test]
    fn noise_model_loads_weights_skipping_headers() {
        let f = write_fixture_stuttermodel();
        let noise = NoiseModel::load(f.path()).unwrap();
        assert_eq!(noise.weights, vec![-3.0, 0.02, -0.01, 1.5, 0.3]);
    }

    #[test]
    fn pdf_spanning_is_symmetric_around_h_when_unclipped() {
        let step = StepModel::load(write_fixture_stepmodel().path()).unwrap();
        let noise = NoiseModel::load(write_fixture_stuttermodel().path()).unwrap();
        let ctx = StutterContext { gc: 0.5, score: 1.0 };
        let h = 500u32;
        let pdf = pdf_spanning(&step, &noise, 3, h, ctx);
        let radius = step.step_size_pmf_for(3).len() / 2;
        for k in 1..=radius {
            let lo = pdf[h as usize - k];
            let hi = pdf[h as usize + k];
            assert!((lo - hi).abs() < 1e-12, "k={k} lo={lo} hi={hi}");
        }
    }

    #[test]
    fn pdf_spanning_sums_close_to_one() {
        let step = StepModel::load(write_fixture_stepmodel().path()).unwrap();
        let noise = NoiseModel::load(write_fixture_stuttermodel().path()).unwrap();
        let ctx = StutterContext { gc: 0.5, score: 1.0 };
        let pdf = pdf_spanning(&step, &noise, 3, 500, ctx);
        let total: f64 = pdf.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pdf_partial_clips_h_to_max_partial() {
        let step = StepModel::load(write_fixture_stepmodel().path()).unwrap();
        let noise = NoiseModel::load(write_fixture_stuttermodel().path()).unwrap();
        let ctx = StutterContext { gc: 0.5, score: 1.0 };
        let uncapped = pdf_partial(&step, &noise, 3, 40, 72, ctx);
        let capped = pdf_partial(&step, &noise, 3, 200, 72, ctx);
        assert_ne!(uncapped, capped);
        // both should carry uniform mass 1/(h'+1) at index 0
        assert!((capped[0] - 1.0 / 73.0).abs() < 1e-9);
    }

    #[test]
    fn pdf_partial_folds_in_the_full_spanning_pmf_not_just_the_last_bin() {
        let step = StepModel::load(write_fixture_stepmodel().path()).unwrap();
        let noise = NoiseModel::load(write_fixture_stuttermodel().path()).unwrap();
        let ctx = StutterContext { gc: 0.5, score: 1.0 };
        let h_prime = 40u32;
        let pdf = pdf_partial(&step, &noise, 3, h_prime, 72, ctx);
        let spanning = pdf_spanning(&step, &noise, 3, h_prime, ctx);
        let c = 1.0 / (h_prime as f64 + 1.0);
        // The spanning PMF's mass sits around index h_prime, well away from
        // the last bin and outside the uniform truncation range (which only
        // covers 0..h_prime); a correct elementwise fold-in deposits it here.
        let idx = h_prime as usize;
        assert!((pdf[idx] - c * spanning[idx]).abs() < 1e-12);
        assert!(pdf[idx] > 0.0, "expected spanning mass folded in at index {idx}");
    }

    #[test]
    fn safe_log_floors_at_small_value() {
        assert!(safe_log(0.0).is_finite());
        assert!(safe_log(0.0) < safe_log(0.5));
    }

    #[test]
    fn missing_step_model_file_surfaces_as_model_data_missing() {
        let err = StepModel::load(Path::new("/nonexistent/path/to/stepmodel.txt")).unwrap_err();
        assert!(err.downcast_ref::<CoreError>().is_some_and(|e| matches!(e, CoreError::ModelDataMissing(_))));
    }

    #[test]
    fn missing_noise_model_file_surfaces_as_model_data_missing() {
        let err = NoiseModel::load(Path::new("/nonexistent/path/to/stuttermodel.txt")).unwrap_err();
        assert!(err.downcast_ref::<CoreError>().is_some_and(|e| matches!(e, CoreError::ModelDataMissing(_))));
    }
}
