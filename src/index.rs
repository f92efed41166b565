use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::html;
use crate::parser::flatten::well_id_from_link;

static MUNILINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*\bid\s*=\s*["'](munilink[^"']*)["'][^>]*>(.*?)</a>"#).unwrap()
});
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").unwrap());
static ROW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>.*?</tr>").unwrap());
static CELL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct County {
    pub name: String,
    /// Id of the `<div>` holding the county's township links.
    pub block_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Township {
    pub name: String,
    /// Suffix of the `permits_{..}` table for this township.
    pub permit_link: String,
}

/// One row of a township's permit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermitRow {
    pub county: String,
    pub township: String,
    pub well_name: String,
    pub royalty: String,
    pub market_value: String,
    pub mcf: String,
    pub link: String,
    pub date_start: String,
    pub permit_number: String,
    pub permit_link: String,
}

impl PermitRow {
    pub fn well_id(&self) -> Option<String> {
        well_id_from_link(&self.link)
    }
}

fn suffix(id: &str) -> &str {
    id.rsplit('_').next().unwrap_or(id)
}

/// `+ Allegheny` anchors → counties.
pub fn counties(page: &str) -> Vec<County> {
    MUNILINK_RE
        .captures_iter(page)
        .map(|c| County {
            name: html::text_of(&c[2]).replace(['+', ' '], ""),
            block_id: format!("munis_{}", suffix(&c[1])),
        })
        .collect()
}

pub fn townships(page: &str, county: &County) -> Vec<Township> {
    let Some(block) = html::element_by_id(page, "div", &county.block_id) else {
        return Vec::new();
    };
    ANCHOR_RE
        .captures_iter(html::inner(block))
        .filter_map(|c| {
            let id = html::attr(c.get(0)?.as_str(), "id")?;
            Some(Township {
                name: html::text_of(&c[1]).replace("+ ", ""),
                permit_link: suffix(id).to_string(),
            })
        })
        .collect()
}

pub fn permit_rows(page: &str, county: &str, township: &Township) -> Vec<PermitRow> {
    let Some(table) = html::element_by_id(page, "div", &format!("permits_{}", township.permit_link))
    else {
        return Vec::new();
    };
    ROW_RE
        .find_iter(table)
        .filter(|row| {
            html::attr(row.as_str(), "class")
                .map(|c| c.starts_with("record_book_row"))
                .unwrap_or(false)
        })
        .filter_map(|row| {
            let cells: Vec<&str> = CELL_RE
                .captures_iter(row.as_str())
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();
            if cells.len() < 7 {
                return None;
            }
            let link_cell = cells[4];
            let link = link_cell
                .find("<a")
                .and_then(|i| html::attr(&link_cell[i..], "href"))?;
            Some(PermitRow {
                county: county.to_string(),
                township: township.name.clone(),
                well_name: html::text_of(cells[0]),
                royalty: html::text_of(cells[1]),
                market_value: html::text_of(cells[2]),
                mcf: html::text_of(cells[3]),
                link: link.to_string(),
                date_start: html::text_of(cells[5]),
                permit_number: html::text_of(cells[6]),
                permit_link: township.permit_link.clone(),
            })
        })
        .collect()
}

/// Every permit row on the index page, walked county → township → table.
pub fn discover(page: &str) -> Vec<PermitRow> {
    counties(page)
        .iter()
        .flat_map(|county| {
            townships(page, county)
                .into_iter()
                .flat_map(move |t| permit_rows(page, &county.name, &t))
        })
        .collect()
}

// ── Tests ──
