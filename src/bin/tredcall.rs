//! # Command line driver for `tredcall`
//!
//! Wires the core library up to `rust-htslib` for alignment file I/O and
//! writes one CSV row per (sample, locus) result. Parallelism is coarse: one
//! rayon task per locus, each owning its own `IndexedReader` and aligner
//! bank, matching the core's single-threaded-per-(sample, locus) contract.
use std::cell::RefCell;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use rayon::prelude::*;
use rust_htslib::bam::{self, Read as BamRead};

use tredcall::caller::{self, CallerConfig};
use tredcall::metadata::{self, GcRegion};
use tredcall::readsource::{Read, ReadSource};
use tredcall::result::GenotypeCall;
use tredcall::stutter::{NoiseModel, StepModel};
use tredcall::utils::CancellationToken;
use tredcall::Locus;

#[derive(Parser)]
#[command(
    name = "tredcall",
    author,
    version,
    about = "Short tandem repeat disease locus genotyper",
    long_about = None
)]
struct Cli {
    /// Alignment file to genotype. Can be SAM/BAM/CRAM.
    #[arg(short, long)]
    alignment: String,

    /// Reference genome, required if `alignment` is CRAM.
    #[arg(long)]
    reference: Option<String>,

    /// Sample name to write into output rows.
    #[arg(long)]
    sample: Option<String>,

    /// Directory holding bundled stutter models and locus metadata. Defaults
    /// to a `data/` directory next to this binary, or `TREDCALL_DATA_DIR`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Restrict to a single locus name (default: genotype every locus in the
    /// metadata table).
    #[arg(long)]
    locus: Option<String>,

    /// Treat reads as if only the repeat locus itself were used as the
    /// alignment reference: switches the REPT aggregator from max to sum,
    /// broadens U_local, and skips pair-of-REPT suppression.
    #[arg(long)]
    clipped_reads: bool,

    /// Force an exhaustive grid search over the full candidate range.
    #[arg(long)]
    fullsearch: bool,

    /// Number of rayon worker threads.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Output CSV path. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// `ReadSource` backed by a `rust-htslib` indexed alignment file. Each
/// instance is used by exactly one worker; the reader is wrapped in a
/// `RefCell` since `IndexedReader::fetch` takes `&mut self` but the trait's
/// methods only need `&self`.
struct HtslibReadSource {
    reader: RefCell<bam::IndexedReader>,
    header: bam::HeaderView,
    readlen: usize,
}

impl HtslibReadSource {
    fn open(path: &str, reference: Option<&str>) -> Result<Self> {
        let mut reader = bam::IndexedReader::from_path(path)
            .with_context(|| format!("opening indexed alignment file {path}"))?;
        if let Some(reference) = reference {
            reader
                .set_reference(reference)
                .with_context(|| format!("setting CRAM reference {reference}"))?;
        }
        let header = reader.header().clone();

        let mut probe = bam::Reader::from_path(path)
            .with_context(|| format!("opening alignment file {path} to sample read length"))?;
        let mut record = bam::Record::new();
        let mut readlen = 0usize;
        while let Some(result) = probe.read(&mut record) {
            result.context("reading a record to sample read length")?;
            if !record.is_unmapped() {
                readlen = record.seq_len();
                break;
            }
        }

        Ok(HtslibReadSource {
            reader: RefCell::new(reader),
            header,
            readlen,
        })
    }

    fn to_read(record: &bam::Record) -> Read {
        let cigar = record.cigar();
        let leading_clip = cigar.leading_softclips();
        let trailing_clip = cigar.trailing_softclips();
        let query_length = record.seq_len() as i64;
        Read {
            name: String::from_utf8_lossy(record.qname()).into_owned(),
            sequence: record.seq().as_bytes(),
            is_reverse: record.is_reverse(),
            is_first_in_pair: record.is_first_in_template(),
            reference_start: record.pos(),
            reference_end: record.reference_end(),
            query_alignment_start: leading_clip,
            query_alignment_end: query_length - trailing_clip,
            query_length,
            mate_reference_id: if record.mtid() >= 0 {
                Some(record.mtid())
            } else {
                None
            },
            mate_reference_start: if record.mtid() >= 0 {
                Some(record.mpos())
            } else {
                None
            },
            template_length: record.insert_size(),
            is_paired: record.is_paired(),
            is_unmapped: record.is_unmapped(),
            is_duplicate: record.is_duplicate(),
            is_supplementary: record.is_supplementary(),
            is_secondary: record.is_secondary(),
            mapping_quality: record.mapq(),
        }
    }
}

impl ReadSource for HtslibReadSource {
    fn fetch(&self, chromosome: &str, start: i64, end: i64) -> Result<Vec<Read>> {
        let tid = self
            .header
            .tid(chromosome.as_bytes())
            .with_context(|| format!("unknown contig {chromosome}"))?;
        let mut reader = self.reader.borrow_mut();
        reader
            .fetch((tid, start.max(0), end))
            .with_context(|| format!("fetching {chromosome}:{start}-{end}"))?;

        let mut reads = Vec::new();
        let mut record = bam::Record::new();
        while let Some(result) = reader.read(&mut record) {
            result.context("reading a record")?;
            reads.push(Self::to_read(&record));
        }
        Ok(reads)
    }

    fn pileup_depth(&self, chromosome: &str, position: i64) -> Result<u32> {
        let tid = self
            .header
            .tid(chromosome.as_bytes())
            .with_context(|| format!("unknown contig {chromosome}"))?;
        let mut reader = self.reader.borrow_mut();
        reader
            .fetch((tid, position.max(0), position + 1))
            .with_context(|| format!("fetching pileup at {chromosome}:{position}"))?;
        for pileup in reader.pileup() {
            let pileup = pileup.context("reading pileup column")?;
            if pileup.pos() as i64 == position {
                return Ok(pileup.depth());
            }
        }
        Ok(0)
    }

    fn peek_readlen(&self) -> Result<usize> {
        Ok(self.readlen)
    }

    fn contig_id(&self, chromosome: &str) -> Result<i32> {
        self.header
            .tid(chromosome.as_bytes())
            .map(|tid| tid as i32)
            .with_context(|| format!("unknown contig {chromosome}"))
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let sample_name = cli.sample.clone().unwrap_or_else(|| {
        let inferred = PathBuf::from(&cli.alignment)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample".to_string());
        info!("Sample name not specified, inferring: {inferred}");
        inferred
    });

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => metadata::data_root()?,
    };

    let step = StepModel::load(&data_dir.join("stepmodels/illumina_v3.pcrfree.stepmodel"))?;
    let noise = NoiseModel::load(&data_dir.join("stepmodels/illumina_v3.pcrfree.stuttermodel"))?;
    let mut loci = metadata::load_loci(
        &data_dir.join("loci/TREDs.meta.csv"),
        Some(&data_dir.join("loci/TREDs.alts.csv")),
    )?;
    if let Some(name) = &cli.locus {
        loci.retain(|l| &l.name == name);
        if loci.is_empty() {
            bail!("no locus named {name} in bundled metadata");
        }
    }
    info!("Genotyping {} locus/loci for sample {sample_name}", loci.len());

    let gc_table: Vec<GcRegion> = metadata::load_gc_table(&data_dir.join("loci/chrY.hg38.unique_ccn.gc"))
        .unwrap_or_default();
    let gender_source = HtslibReadSource::open(&cli.alignment, cli.reference.as_deref())?;
    let (is_male, depth_y) = if gc_table.is_empty() {
        (false, 0)
    } else {
        metadata::infer_gender(&gender_source, &gc_table, 10).unwrap_or((false, 0))
    };
    info!("Inferred gender: {}, depthY={depth_y}", if is_male { "male" } else { "female" });

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads.max(1))
        .build_global()
        .context("building rayon thread pool")?;

    let config = CallerConfig {
        clipped_mode: cli.clipped_reads,
        fullsearch: cli.fullsearch,
        ..CallerConfig::default()
    };
    let cancel = CancellationToken::new();

    let calls: Vec<GenotypeCall> = loci
        .par_iter()
        .filter_map(|locus| genotype_one(locus, &cli, &step, &noise, is_male, config, &cancel))
        .collect();

    write_output(&cli, &sample_name, is_male, depth_y, gender_source.readlen, &calls)?;

    Ok(())
}

fn genotype_one(
    locus: &Locus,
    cli: &Cli,
    step: &StepModel,
    noise: &NoiseModel,
    is_male: bool,
    config: CallerConfig,
    cancel: &CancellationToken,
) -> Option<GenotypeCall> {
    let source = match HtslibReadSource::open(&cli.alignment, cli.reference.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            warn!("locus {}: could not open alignment file: {e:#}", locus.name);
            return None;
        }
    };
    match caller::call(locus, &source, step, noise, is_male, config, cancel) {
        Ok(call) => Some(call),
        Err(e) => {
            warn!("locus {}: genotyping failed: {e:#}", locus.name);
            None
        }
    }
}

fn write_output(
    cli: &Cli,
    sample_name: &str,
    is_male: bool,
    depth_y: u32,
    readlen: usize,
    calls: &[GenotypeCall],
) -> Result<()> {
    let mut writer: csv::Writer<Box<dyn std::io::Write>> = match &cli.output {
        Some(path) => csv::Writer::from_writer(Box::new(
            std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => csv::Writer::from_writer(Box::new(std::io::stdout())),
    };

    writer.write_record([
        "sample",
        "inferredGender",
        "depthY",
        "readLen",
        "locus",
        "h1",
        "h2",
        "FDP",
        "PDP",
        "RDP",
        "PEDP",
        "PEG",
        "PET",
        "CI",
        "PP",
        "label",
    ])?;

    for call in calls {
        writer.write_record([
            sample_name.to_string(),
            if is_male { "male" } else { "female" }.to_string(),
            depth_y.to_string(),
            readlen.to_string(),
            call.locus_name.clone(),
            call.alleles.0.to_string(),
            call.alleles.1.to_string(),
            call.fdp.to_string(),
            call.pdp.to_string(),
            call.rdp.to_string(),
            call.pedp.to_string(),
            call.peg.clone().unwrap_or_default(),
            call.pet.clone().unwrap_or_default(),
            call.format_ci().unwrap_or_default(),
            format!("{:.4}", call.pp),
            call.label.as_str().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
