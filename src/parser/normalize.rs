use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{Month, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::segment::PeriodGroup;
use crate::error::ReportError;

/// Reserved label under which a group's marker token is stored.
pub const PERIOD_LABEL: &str = "period";

static PERIOD_SLICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{3})([0-9]{4})$").unwrap());

/// Label → raw value for one period.
pub type RawRecord = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub avg_production: Option<f64>,
    pub est_royalties: Option<f64>,
    pub operating_days: Option<i64>,
    pub production_company: Option<String>,
    pub quantity_of_gas: Option<f64>,
    pub value_of_gas: Option<f64>,
    pub crowd_source_atw: Option<f64>,
    /// Canonical `YYYY-MM`.
    pub period: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    AvgProduction,
    EstRoyalties,
    OperatingDays,
    ProductionCompany,
    QuantityOfGas,
    ValueOfGas,
    CrowdSourceAtw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coercion {
    Float,
    Int,
    Company,
}

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Float(f64),
    Int(i64),
    Text(String),
}

struct FieldRule {
    field: Field,
    label: &'static str,
    pattern: Option<Regex>,
    coercion: Coercion,
}

// Patterns differ in strictness on purpose: the royalties rule is greedy and
// only captures the tail before `(`, quantity takes the first number anywhere.
static RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    let rule = |field, label, pattern: Option<&str>, coercion| FieldRule {
        field,
        label,
        pattern: pattern.map(|p| Regex::new(p).unwrap()),
        coercion,
    };
    vec![
        rule(Field::AvgProduction, "AvgProductionPerDay", Some(r":\$([0-9.,]+)\("), Coercion::Float),
        rule(Field::EstRoyalties, "Est_Royalties", Some(r".*([0-9,.]+)\("), Coercion::Float),
        rule(Field::OperatingDays, "OperatingDays", Some(r"([0-9]+)"), Coercion::Int),
        rule(Field::ProductionCompany, "ProductionCompany", None, Coercion::Company),
        rule(Field::QuantityOfGas, "QuantityofGas", Some(r"([0-9,.]+)"), Coercion::Float),
        rule(Field::ValueOfGas, "ValueofGas", Some(r"\$([0-9,.]+)\("), Coercion::Float),
        rule(Field::CrowdSourceAtw, "crowdsourcedATW", Some(r"([0-9.,]+)/"), Coercion::Float),
    ]
});

/// Strip `:` and turn `.` into `_`, so `Est.Royalties:` becomes `Est_Royalties`.
pub fn clean_label(label: &str) -> String {
    label.replace(':', "").replace('.', "_")
}

/// Pair even-index labels with odd-index values; unpaired trailing labels are
/// dropped. The group key is stored under [`PERIOD_LABEL`].
pub fn demultiplex(group: &PeriodGroup) -> RawRecord {
    let labels = group.values.iter().step_by(2);
    let values = group.values.iter().skip(1).step_by(2);
    let mut record: RawRecord = labels
        .zip(values)
        .map(|(l, v)| (clean_label(l), v.clone()))
        .collect();
    record.insert(PERIOD_LABEL.to_string(), group.key.clone());
    record
}

fn extract(rule: &FieldRule, record: &RawRecord) -> Option<FieldValue> {
    let raw = record.get(rule.label)?;
    if rule.coercion == Coercion::Company {
        return Some(FieldValue::Text(raw.replace(':', "").replace("&amp", "_")));
    }
    let pattern = rule.pattern.as_ref()?;
    let captured = pattern.captures(raw)?.get(1)?.as_str().replace(',', "");
    match rule.coercion {
        Coercion::Float => captured.parse().ok().map(FieldValue::Float),
        Coercion::Int => captured.parse().ok().map(FieldValue::Int),
        Coercion::Company => None,
    }
}

impl CleanedRecord {
    fn set(&mut self, field: Field, value: FieldValue) {
        match (field, value) {
            (Field::AvgProduction, FieldValue::Float(v)) => self.avg_production = Some(v),
            (Field::EstRoyalties, FieldValue::Float(v)) => self.est_royalties = Some(v),
            (Field::OperatingDays, FieldValue::Int(v)) => self.operating_days = Some(v),
            (Field::ProductionCompany, FieldValue::Text(v)) => self.production_company = Some(v),
            (Field::QuantityOfGas, FieldValue::Float(v)) => self.quantity_of_gas = Some(v),
            (Field::ValueOfGas, FieldValue::Float(v)) => self.value_of_gas = Some(v),
            (Field::CrowdSourceAtw, FieldValue::Float(v)) => self.crowd_source_atw = Some(v),
            _ => {}
        }
    }
}

/// Canonical `YYYY-MM` from a period marker such as `OperatingPeriod:01/2020-Dec2020`.
pub fn canonical_period(raw: &str) -> Result<String, ReportError> {
    let tail = raw.rsplit(':').next().unwrap_or(raw);
    let tail = tail.rsplit('-').next().unwrap_or(tail);
    let slice: String = tail.chars().take(7).collect();

    let fail = || ReportError::PeriodParse {
        raw: raw.to_string(),
        slice: slice.clone(),
    };
    let caps = PERIOD_SLICE_RE.captures(&slice).ok_or_else(fail)?;
    let month: Month = caps[1].parse().map_err(|_| fail())?;
    let year: i32 = caps[2].parse().map_err(|_| fail())?;
    if year < 1 {
        return Err(fail());
    }
    let date = NaiveDate::from_ymd_opt(year, month.number_from_month(), 1).ok_or_else(fail)?;
    Ok(date.format("%Y-%m").to_string())
}

/// Run every field rule over an already demultiplexed record.
pub fn clean_record(record: &RawRecord) -> Result<CleanedRecord, ReportError> {
    let raw_period = record.get(PERIOD_LABEL).map(String::as_str).unwrap_or("");
    let mut cleaned = CleanedRecord {
        period: canonical_period(raw_period)?,
        ..Default::default()
    };
    for rule in RULES.iter() {
        if let Some(value) = extract(rule, record) {
            cleaned.set(rule.field, value);
        }
    }
    Ok(cleaned)
}

pub fn normalize(group: &PeriodGroup) -> Result<CleanedRecord, ReportError> {
    clean_record(&demultiplex(group))
}

// ── Tests ──
