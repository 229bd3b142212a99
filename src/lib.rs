//! # tredcall
//!
//! Core genotyping library for short tandem repeat disease loci (TREDs):
//! classifies aligned reads around a locus, extracts the paired-end
//! insert-size distribution, and runs an integrated likelihood caller that
//! infers diploid (or haploid, for X-linked loci in males) repeat-unit
//! genotypes together with a posterior pathology probability.
//!
//! The library never reads alignment files itself; callers provide a
//! [`readsource::ReadSource`] implementation, keeping the core's numeric
//! sections free of any htslib dependency. A binary wiring this library up
//! to `rust-htslib` lives in `bin/tredcall.rs`.
pub mod aligner;
pub mod caller;
pub mod classify;
pub mod error;
pub mod locus;
pub mod metadata;
pub mod pe;
pub mod pe_likelihood;
pub mod readsource;
pub mod result;
pub mod stutter;
pub mod utils;

pub use caller::{call, CallerConfig};
pub use locus::Locus;
pub use readsource::{Read, ReadSource};
pub use result::GenotypeCall;
