use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::warn;

use crate::index::PermitRow;
use crate::parser::report::{normalize_well_name, ParsedWell};

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS wells (
            id            INTEGER PRIMARY KEY,
            well_name     TEXT UNIQUE NOT NULL,
            raw_name      TEXT NOT NULL,
            county        TEXT NOT NULL,
            township      TEXT NOT NULL,
            well_id       TEXT,
            link          TEXT NOT NULL,
            royalty       TEXT,
            market_value  TEXT,
            mcf           TEXT,
            date_start    TEXT,
            permit_number TEXT,
            permit_link   TEXT,
            visited       BOOLEAN NOT NULL DEFAULT 0,
            visited_at    TEXT,
            processed_at  TEXT,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_wells_visited ON wells(visited);

        CREATE TABLE IF NOT EXISTS report_pages (
            id         INTEGER PRIMARY KEY,
            well_pk    INTEGER NOT NULL REFERENCES wells(id),
            url        TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_report_pages_well ON report_pages(well_pk);

        CREATE TABLE IF NOT EXISTS production_records (
            id                 INTEGER PRIMARY KEY,
            well_name          TEXT NOT NULL REFERENCES wells(well_name),
            seq                INTEGER NOT NULL,
            period             TEXT NOT NULL,
            avg_production     REAL,
            est_royalties      REAL,
            operating_days     INTEGER,
            production_company TEXT,
            quantity_of_gas    REAL,
            value_of_gas       REAL,
            crowd_source_atw   REAL,
            UNIQUE(well_name, seq)
        );
        CREATE INDEX IF NOT EXISTS idx_records_period ON production_records(period);

        CREATE TABLE IF NOT EXISTS rejected_periods (
            id          INTEGER PRIMARY KEY,
            well_name   TEXT NOT NULL REFERENCES wells(well_name),
            raw_key     TEXT NOT NULL,
            reason      TEXT NOT NULL,
            UNIQUE(well_name, raw_key)
        );
        ",
    )?;
    Ok(())
}

/// Duplicate check the ingestion side runs before parsing a well.
pub trait WellStore {
    fn exists(&self, well_name: &str) -> Result<bool>;
}

impl WellStore for Connection {
    fn exists(&self, well_name: &str) -> Result<bool> {
        let n: usize = self.query_row(
            "SELECT COUNT(*) FROM wells WHERE well_name = ?1 AND processed_at IS NOT NULL",
            [normalize_well_name(well_name)],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }
}

// ── Queue ──

/// Queue permit rows. Rows whose report link carries no `well_id` cannot be
/// parsed later and are left out.
pub fn insert_wells(conn: &Connection, rows: &[PermitRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO wells
             (well_name, raw_name, county, township, well_id, link, royalty, market_value,
              mcf, date_start, permit_number, permit_link)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for r in rows {
            let Some(well_id) = r.well_id() else {
                warn!("No well_id in report link {:?} for {}, not queued", r.link, r.well_name);
                continue;
            };
            count += stmt.execute(rusqlite::params![
                normalize_well_name(&r.well_name),
                r.well_name,
                r.county,
                r.township,
                well_id,
                r.link,
                r.royalty,
                r.market_value,
                r.mcf,
                r.date_start,
                r.permit_number,
                r.permit_link,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct QueuedWell {
    pub well_pk: i64,
    pub well_name: String,
    pub link: String,
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<QueuedWell>> {
    let sql = format!(
        "SELECT id, well_name, link FROM wells WHERE visited = 0 ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(QueuedWell {
                well_pk: row.get(0)?,
                well_name: row.get(1)?,
                link: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct PageRow {
    pub well_pk: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

// ── Processing ──

pub struct FetchedPage {
    pub well_name: String,
    pub raw_name: String,
    pub county: String,
    pub township: String,
    pub well_id: String,
    pub html: String,
}

/// Latest successfully fetched page of every well that has not been processed.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<FetchedPage>> {
    let sql = format!(
        "SELECT w.well_name, w.raw_name, w.county, w.township, w.well_id, rp.html
         FROM wells w
         JOIN report_pages rp ON rp.id = (
             SELECT MAX(id) FROM report_pages
             WHERE well_pk = w.id AND html IS NOT NULL AND error IS NULL
         )
         WHERE w.processed_at IS NULL AND w.well_id IS NOT NULL
         ORDER BY w.id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FetchedPage {
                well_name: row.get(0)?,
                raw_name: row.get(1)?,
                county: row.get(2)?,
                township: row.get(3)?,
                well_id: row.get(4)?,
                html: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct SaveCounts {
    pub wells: usize,
    pub records: usize,
    pub requeued: usize,
}

const NO_PANEL_ERROR: &str = "no report panel in page";

/// Replace the stored records of each well and mark it processed.
///
/// A well without any period (panel missing, typically a login page served
/// after the session lapsed) is not stored: its page is marked as failed and
/// the well goes back into the fetch queue.
pub fn save_reports(conn: &Connection, wells: &[ParsedWell]) -> Result<SaveCounts> {
    let tx = conn.unchecked_transaction()?;
    let mut counts = SaveCounts {
        wells: 0,
        records: 0,
        requeued: 0,
    };
    {
        let mut clear_records = tx.prepare("DELETE FROM production_records WHERE well_name = ?1")?;
        let mut clear_rejected = tx.prepare("DELETE FROM rejected_periods WHERE well_name = ?1")?;
        let mut r_stmt = tx.prepare(
            "INSERT INTO production_records
             (well_name, seq, period, avg_production, est_royalties, operating_days,
              production_company, quantity_of_gas, value_of_gas, crowd_source_atw)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        let mut x_stmt = tx.prepare(
            "INSERT OR IGNORE INTO rejected_periods (well_name, raw_key, reason)
             VALUES (?1, ?2, ?3)",
        )?;
        let mut done = tx.prepare(
            "UPDATE wells SET processed_at = datetime('now') WHERE well_name = ?1",
        )?;
        let mut fail_pages = tx.prepare(
            "UPDATE report_pages SET error = ?2
             WHERE error IS NULL AND well_pk = (SELECT id FROM wells WHERE well_name = ?1)",
        )?;
        let mut requeue = tx.prepare(
            "UPDATE wells SET visited = 0, visited_at = NULL WHERE well_name = ?1",
        )?;

        for well in wells {
            let name = &well.report.identity.well_name;
            if well.is_empty() {
                warn!("No report data for {}, queued for another fetch", name);
                fail_pages.execute(rusqlite::params![name, NO_PANEL_ERROR])?;
                requeue.execute([name])?;
                counts.requeued += 1;
                continue;
            }
            clear_records.execute([name])?;
            clear_rejected.execute([name])?;
            for (seq, r) in well.report.production_report.iter().enumerate() {
                r_stmt.execute(rusqlite::params![
                    name,
                    seq as i64,
                    r.period,
                    r.avg_production,
                    r.est_royalties,
                    r.operating_days,
                    r.production_company,
                    r.quantity_of_gas,
                    r.value_of_gas,
                    r.crowd_source_atw,
                ])?;
                counts.records += 1;
            }
            for x in &well.rejected {
                x_stmt.execute(rusqlite::params![name, x.key, x.reason])?;
            }
            done.execute([name])?;
            counts.wells += 1;
        }
    }
    tx.commit()?;
    Ok(counts)
}

// ── Reporting ──

pub fn fetch_periods(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT period FROM production_records ORDER BY period")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct CountyCount {
    pub county: String,
    pub wells: usize,
}

/// Wells per county reporting production in one canonical period.
pub fn fetch_overview(conn: &Connection, period: &str) -> Result<Vec<CountyCount>> {
    let mut stmt = conn.prepare(
        "SELECT UPPER(w.county), COUNT(DISTINCT pr.well_name) AS n
         FROM production_records pr
         JOIN wells w ON w.well_name = pr.well_name
         WHERE pr.period = ?1
         GROUP BY UPPER(w.county)
         ORDER BY n DESC, UPPER(w.county)",
    )?;
    let rows = stmt
        .query_map([period], |row| {
            Ok(CountyCount {
                county: row.get(0)?,
                wells: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct Stats {
    pub queued: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub errors: usize,
    pub processed: usize,
    pub records: usize,
    pub rejected: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let queued = count("SELECT COUNT(*) FROM wells")?;
    let visited = count("SELECT COUNT(*) FROM wells WHERE visited = 1")?;
    Ok(Stats {
        queued,
        visited,
        unvisited: queued - visited,
        fetched: count("SELECT COUNT(*) FROM report_pages")?,
        errors: count("SELECT COUNT(*) FROM report_pages WHERE error IS NOT NULL")?,
        processed: count("SELECT COUNT(*) FROM wells WHERE processed_at IS NOT NULL")?,
        records: count("SELECT COUNT(*) FROM production_records")?,
        rejected: count("SELECT COUNT(*) FROM rejected_periods")?,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::normalize::CleanedRecord;
    use crate::parser::report::{RejectedPeriod, WellIdentity, WellReport};

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn permit(name: &str, county: &str, well_id: &str) -> PermitRow {
        PermitRow {
            county: county.into(),
            township: "Pine Twp".into(),
            well_name: name.into(),
            royalty: "$1,000".into(),
            market_value: "$5,000".into(),
            mcf: "1,200".into(),
            link: format!("/well_report.php?well_id={}", well_id),
            date_start: "2014-03-01".into(),
            permit_number: "125-27001".into(),
            permit_link: "88".into(),
        }
    }

    fn parsed(name: &str, county: &str, periods: &[&str]) -> ParsedWell {
        ParsedWell {
            report: WellReport {
                identity: WellIdentity::normalized(county, "Pine Twp", name),
                production_report: periods
                    .iter()
                    .map(|p| CleanedRecord {
                        period: p.to_string(),
                        operating_days: Some(30),
                        ..Default::default()
                    })
                    .collect(),
            },
            rejected: vec![RejectedPeriod {
                key: "OperatingPeriod:TBD".into(),
                reason: "bad".into(),
            }],
        }
    }

    fn add_page(conn: &Connection, well_pk: i64, html: Option<&str>) {
        conn.execute(
            "INSERT INTO report_pages (well_pk, url, html) VALUES (?1, 'u', ?2)",
            rusqlite::params![well_pk, html],
        )
        .unwrap();
    }

    #[test]
    fn queue_ignores_duplicate_wells() {
        let conn = memory();
        let rows = vec![permit("Smith Pad 1", "Allegheny", "1"), permit("Smith Pad 1", "Allegheny", "1")];
        assert_eq!(insert_wells(&conn, &rows).unwrap(), 1);
        let queued = fetch_unvisited(&conn, None).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].well_name, "smith_pad_1");
    }

    #[test]
    fn exists_after_processing() {
        let conn = memory();
        insert_wells(&conn, &[permit("Smith Pad 1", "Allegheny", "1")]).unwrap();
        assert!(!conn.exists("Smith Pad 1").unwrap());
        save_reports(&conn, &[parsed("Smith Pad 1", "Allegheny", &["2020-01"])]).unwrap();
        assert!(conn.exists("Smith Pad 1").unwrap());
        assert!(conn.exists("smith_pad_1").unwrap());
    }

    #[test]
    fn unprocessed_uses_latest_good_page() {
        let conn = memory();
        insert_wells(&conn, &[permit("Pad A", "Greene", "7")]).unwrap();
        add_page(&conn, 1, Some("<old/>"));
        add_page(&conn, 1, Some("<new/>"));
        add_page(&conn, 1, None);
        let pages = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].html, "<new/>");
        assert_eq!(pages[0].well_id, "7");

        save_reports(&conn, &[parsed("Pad A", "Greene", &["2020-01"])]).unwrap();
        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn save_replaces_previous_records() {
        let conn = memory();
        insert_wells(&conn, &[permit("Pad A", "Greene", "7")]).unwrap();
        assert_eq!(save_reports(&conn, &[parsed("Pad A", "Greene", &["2020-01", "2020-02"])]).unwrap().records, 2);
        assert_eq!(save_reports(&conn, &[parsed("Pad A", "Greene", &["2020-03"])]).unwrap().records, 1);
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.records, 1);
        assert_eq!(s.rejected, 1);
        assert_eq!(s.processed, 1);
        assert_eq!(fetch_periods(&conn).unwrap(), vec!["2020-03"]);
    }

    #[test]
    fn overview_counts_by_county() {
        let conn = memory();
        insert_wells(
            &conn,
            &[
                permit("Pad A", "Greene", "1"),
                permit("Pad B", "Greene", "2"),
                permit("Pad C", "Allegheny", "3"),
            ],
        )
        .unwrap();
        save_reports(
            &conn,
            &[
                // Duplicate period markers give two records for one well.
                parsed("Pad A", "Greene", &["2020-01", "2020-01", "2020-02"]),
                parsed("Pad B", "Greene", &["2020-01"]),
                parsed("Pad C", "Allegheny", &["2020-01"]),
            ],
        )
        .unwrap();
        let rows = fetch_overview(&conn, "2020-01").unwrap();
        let pairs: Vec<(&str, usize)> = rows.iter().map(|r| (r.county.as_str(), r.wells)).collect();
        assert_eq!(pairs, vec![("GREENE", 2), ("ALLEGHENY", 1)]);
        assert_eq!(fetch_periods(&conn).unwrap(), vec!["2020-01", "2020-02"]);
    }

    #[test]
    fn queue_skips_rows_without_well_id() {
        let conn = memory();
        let mut broken = permit("Pad X", "Greene", "1");
        broken.link = "/well_report.php?permit=125-27001".into();
        let rows = vec![broken, permit("Pad Y", "Greene", "2")];
        assert_eq!(insert_wells(&conn, &rows).unwrap(), 1);
        let queued = fetch_unvisited(&conn, None).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].well_name, "pad_y");
    }

    #[test]
    fn panel_missing_requeues_well() {
        let conn = memory();
        insert_wells(&conn, &[permit("Pad A", "Greene", "7")]).unwrap();
        conn.execute("UPDATE wells SET visited = 1", []).unwrap();
        add_page(&conn, 1, Some("<html><form id='login'></form></html>"));

        let pages = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pages.len(), 1);
        let well = crate::parser::process_report(
            pages[0].html.as_bytes(),
            "7",
            &pages[0].county,
            &pages[0].township,
            &pages[0].raw_name,
        );
        assert!(well.is_empty());

        let counts = save_reports(&conn, &[well]).unwrap();
        assert_eq!((counts.wells, counts.records, counts.requeued), (0, 0, 1));
        assert!(!conn.exists("Pad A").unwrap());
        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());
        assert_eq!(fetch_unvisited(&conn, None).unwrap().len(), 1);

        // A later good fetch is picked up again.
        add_page(&conn, 1, Some("<div id='pro_7'>x</div>"));
        assert_eq!(fetch_unprocessed(&conn, None).unwrap().len(), 1);
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.processed, 0);
        assert_eq!(s.errors, 1);
    }
}
