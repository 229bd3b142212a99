//! # Error taxonomy
//!
//! Named error kinds that callers can match on, per the error handling design.
//! Ad hoc, context-carrying failures elsewhere in the crate use
//! `anyhow::Result` instead (file I/O, parsing) exactly as the rest of the
//! crate does; this enum exists only for the small set of error kinds that
//! the driver needs to branch on.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The read source could not serve the requested locus window (missing or
    /// corrupt index, no such contig). The driver should treat the call for
    /// this locus as absent and move on to the next one.
    #[error("read source unavailable for {chromosome}:{start}-{end}: {reason}")]
    InputUnavailable {
        chromosome: String,
        start: i64,
        end: i64,
        reason: String,
    },

    /// A bundled model or metadata resource could not be loaded. Fatal to
    /// constructing a caller instance.
    #[error("required model/metadata resource missing: {0}")]
    ModelDataMissing(String),

    /// Cooperative cancellation fired between grid iterations or read
    /// batches. Carries no partial output.
    #[error("call interrupted by cancellation")]
    Interrupted,
}
