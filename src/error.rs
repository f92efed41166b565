use thiserror::Error;

/// Per-record failure raised by the report pipeline. Field misses are not
/// errors; they come back as `None` on the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("cannot canonicalize period '{raw}': '{slice}' is not a month/year token")]
    PeriodParse { raw: String, slice: String },
}
