//! Locus metadata loader and bundled-resource resolution.
//!
//! Out of the core's scope proper (spec treats the metadata loader as an
//! external collaborator), but every driver needs it, so it lives here
//! rather than being duplicated across binaries.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::locus::{AltRegion, Locus, LocusRecord};
use crate::readsource::ReadSource;
use crate::utils::median_i64;

/// Resolves the directory that bundled resources (stutter models, locus
/// metadata, the Y-depth probe table) are read from at runtime.
///
/// Checks `TREDCALL_DATA_DIR` first so deployments can relocate the bundle,
/// then falls back to a `data/` directory next to the running executable,
/// which is how the binary is packaged.
pub fn data_root() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TREDCALL_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let exe = std::env::current_exe().context("resolving current executable path")?;
    let dir = exe
        .parent()
        .context("executable path has no parent directory")?
        .join("data");
    Ok(dir)
}

#[derive(Debug, Deserialize)]
struct AltRegionRow {
    name: String,
    alt_regions: String,
}

/// Loads every locus row from `meta_path`, joining in alternative genomic
/// regions from `alts_path` if present.
pub fn load_loci(meta_path: &Path, alts_path: Option<&Path>) -> Result<Vec<Locus>> {
    let mut alts_by_name: HashMap<String, Vec<AltRegion>> = HashMap::new();
    if let Some(alts_path) = alts_path {
        let mut reader = csv::Reader::from_path(alts_path)
            .with_context(|| format!("opening alt-regions file {}", alts_path.display()))?;
        for row in reader.deserialize() {
            let row: AltRegionRow = row.with_context(|| {
                format!("parsing alt-regions row in {}", alts_path.display())
            })?;
            if row.alt_regions.trim().is_empty() {
                continue;
            }
            let regions = row
                .alt_regions
                .split('|')
                .map(parse_region)
                .collect::<Result<Vec<_>>>()?;
            alts_by_name.insert(row.name, regions);
        }
    }

    let mut reader = csv::Reader::from_path(meta_path)
        .with_context(|| format!("opening locus metadata file {}", meta_path.display()))?;
    let mut loci = Vec::new();
    for row in reader.deserialize() {
        let record: LocusRecord =
            row.with_context(|| format!("parsing locus row in {}", meta_path.display()))?;
        let alt_regions = alts_by_name.remove(&record.name).unwrap_or_default();
        loci.push(record.into_locus(alt_regions)?);
    }
    Ok(loci)
}

fn parse_region(s: &str) -> Result<AltRegion> {
    let (chrom, range) = s
        .split_once(':')
        .with_context(|| format!("malformed alt region {s}"))?;
    let (start_s, end_s) = range
        .split_once('-')
        .with_context(|| format!("malformed alt region {s}"))?;
    let start: i64 = start_s
        .parse()
        .with_context(|| format!("bad alt region start in {s}"))?;
    let end: i64 = end_s
        .parse()
        .with_context(|| format!("bad alt region end in {s}"))?;
    Ok(AltRegion {
        chromosome: chrom.to_string(),
        start: start - 1,
        end,
    })
}

/// One probed region from the Y-chromosome unique-copy-number table.
#[derive(Debug, Clone)]
pub struct GcRegion {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    pub gc: f64,
}

/// Indices skipped when walking the bundled Y-depth probe table: low-
/// mappability/high-variance regions identified offline.
pub const Y_EXCLUDED_INDICES: [usize; 10] = [1, 4, 6, 7, 10, 11, 13, 16, 18, 19];

/// Number of probe regions used to estimate Y-chromosome depth.
pub const Y_PROBE_COUNT: usize = 5;

/// Loads the `chrY.<ref>.unique_ccn.gc` table: one region per line as `chr
/// start end gc`, whitespace-separated.
pub fn load_gc_table(path: &Path) -> Result<Vec<GcRegion>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("opening gc table {}", path.display()))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let mut fields = line.split_whitespace();
            let chromosome = fields
                .next()
                .with_context(|| format!("missing chromosome field in {}", path.display()))?
                .to_string();
            let start: i64 = fields
                .next()
                .with_context(|| format!("missing start field in {}", path.display()))?
                .parse()
                .with_context(|| format!("bad start field in {}", path.display()))?;
            let end: i64 = fields
                .next()
                .with_context(|| format!("missing end field in {}", path.display()))?
                .parse()
                .with_context(|| format!("bad end field in {}", path.display()))?;
            let gc: f64 = fields
                .next()
                .with_context(|| format!("missing gc field in {}", path.display()))?
                .parse()
                .with_context(|| format!("bad gc field in {}", path.display()))?;
            Ok(GcRegion { chromosome, start, end, gc })
        })
        .collect()
}

/// Infers sample gender and Y-chromosome depth by probing the first
/// [`Y_PROBE_COUNT`] usable regions in the bundled GC table (after skipping
/// [`Y_EXCLUDED_INDICES`]) and taking the median of their read depths.
///
/// Gender inference sits deliberately outside the core's `call()` boundary:
/// it is computed once per sample and fed in as the `is_male` flag that
/// decides ploidy for X-linked loci, not recomputed per locus.
pub fn infer_gender(source: &dyn ReadSource, gc_table: &[GcRegion], male_depth_floor: u32) -> Result<(bool, u32)> {
    let probed: Vec<&GcRegion> = gc_table
        .iter()
        .enumerate()
        .filter(|(i, _)| !Y_EXCLUDED_INDICES.contains(i))
        .take(Y_PROBE_COUNT)
        .map(|(_, region)| region)
        .collect();

    let mut depths = Vec::with_capacity(probed.len());
    for region in &probed {
        let mid = (region.start + region.end) / 2;
        let d = source.pileup_depth(&region.chromosome, mid)?;
        depths.push(d as i64);
    }
    let depth_y = median_i64(&depths).unwrap_or(0).max(0) as u32;
    Ok((depth_y >= male_depth_floor, depth_y))
}
