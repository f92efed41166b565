use serde::{Deserialize, Serialize};
use tracing::warn;

use super::normalize::{normalize, CleanedRecord};
use super::segment::PeriodGroup;
use crate::error::ReportError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellIdentity {
    pub county: String,
    pub township: String,
    pub well_name: String,
}

impl WellIdentity {
    /// Lowercase county and township; lowercase the well name and join its
    /// words with `_`.
    pub fn normalized(county: &str, township: &str, well_name: &str) -> Self {
        WellIdentity {
            county: county.to_lowercase(),
            township: township.to_lowercase(),
            well_name: normalize_well_name(well_name),
        }
    }
}

pub fn normalize_well_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellReport {
    #[serde(flatten)]
    pub identity: WellIdentity,
    /// One record per operating period, in page order.
    pub production_report: Vec<CleanedRecord>,
}

/// A period whose marker could not be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedPeriod {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedWell {
    pub report: WellReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedPeriod>,
}

impl ParsedWell {
    /// No periods at all, e.g. the report panel was absent from the page.
    pub fn is_empty(&self) -> bool {
        self.report.production_report.is_empty() && self.rejected.is_empty()
    }
}

/// Normalize every group; failures stay with their period and never stop
/// the siblings.
pub fn assemble(identity: WellIdentity, groups: &[PeriodGroup]) -> ParsedWell {
    let mut records = Vec::with_capacity(groups.len());
    let mut rejected = Vec::new();
    for group in groups {
        match normalize(group) {
            Ok(record) => records.push(record),
            Err(e @ ReportError::PeriodParse { .. }) => {
                warn!(well = %identity.well_name, key = %group.key, "{}", e);
                rejected.push(RejectedPeriod {
                    key: group.key.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    ParsedWell {
        report: WellReport {
            identity,
            production_report: records,
        },
        rejected,
    }
}

// ── Tests ──
