pub mod flatten;
pub mod normalize;
pub mod report;
pub mod segment;

use report::{ParsedWell, WellIdentity};

/// Three-stage pipeline: panel → tokens → period groups → typed records.
pub fn process_report(
    page: &[u8],
    well_id: &str,
    county: &str,
    township: &str,
    well_name: &str,
) -> ParsedWell {
    let tokens = flatten::flatten_page(page, well_id);
    let groups = segment::segment(&tokens);
    report::assemble(WellIdentity::normalized(county, township, well_name), &groups)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<u8> {
        std::fs::read("tests/fixtures/well_report.html").unwrap()
    }

    #[test]
    fn fixture_report() {
        let parsed = process_report(&fixture(), "10452", "Washington", "Amwell Twp", "Baker Unit 3H");
        let report = &parsed.report;
        assert_eq!(report.identity.well_name, "baker_unit_3h");
        assert_eq!(report.identity.township, "amwell twp");

        let periods: Vec<&str> = report.production_report.iter().map(|r| r.period.as_str()).collect();
        assert_eq!(periods, vec!["2020-12", "2020-06", "2019-12"]);

        let first = &report.production_report[0];
        assert_eq!(first.avg_production, Some(4512.25));
        assert_eq!(first.operating_days, Some(184));
        assert_eq!(first.quantity_of_gas, Some(830254.0));
        assert_eq!(first.value_of_gas, Some(1452944.5));
        assert_eq!(first.crowd_source_atw, Some(1.75));
        assert_eq!(first.production_company.as_deref(), Some("RangeResources_;Appalachia"));

        // Sparse period: only operating days reported.
        let last = &report.production_report[2];
        assert_eq!(last.operating_days, Some(31));
        assert_eq!(last.avg_production, None);
        assert_eq!(last.value_of_gas, None);
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn other_panels_ignored() {
        let parsed = process_report(&fixture(), "99999", "Washington", "Amwell Twp", "Other");
        assert_eq!(parsed.report.production_report.len(), 1);
        assert_eq!(parsed.report.production_report[0].period, "2021-03");
    }

    #[test]
    fn absent_panel_yields_empty_report() {
        let parsed = process_report(&fixture(), "1", "Washington", "Amwell Twp", "Ghost");
        assert!(parsed.report.production_report.is_empty());
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn end_to_end_single_period() {
        let html = br#"<div id="pro_5">
            <div class="period"><b>Operating Period: Jan 2021</b></div>
            <div><span>Avg Production Per Day:</span><span>Avg Production Per Day: $500.00 (unit)</span></div>
            <div><span>Operating Days:</span><span>Operating Days: 28 days</span></div>
        </div>"#;
        let tokens = flatten::flatten_page(html, "5");
        assert_eq!(
            tokens,
            vec![
                "OperatingPeriod:Jan2021",
                "AvgProductionPerDay:",
                "AvgProductionPerDay:$500.00(unit)",
                "OperatingDays:",
                "OperatingDays:28days",
            ]
        );
        let groups = segment::segment(&tokens);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "OperatingPeriod:Jan2021");

        let record = normalize::normalize(&groups[0]).unwrap();
        assert_eq!(record.avg_production, Some(500.0));
        assert_eq!(record.operating_days, Some(28));
        assert_eq!(record.period, "2021-01");
        assert_eq!(record.est_royalties, None);
        assert_eq!(record.production_company, None);
        assert_eq!(record.quantity_of_gas, None);
        assert_eq!(record.value_of_gas, None);
        assert_eq!(record.crowd_source_atw, None);
    }
}
