use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{PageRow, QueuedWell};
use crate::settings::Settings;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const INDEX_PATH: &str = "/pro_update.php";
const LOGIN_PAGE_ERROR: &str = "login page served instead of report";

static PASSWORD_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<input\b[^>]*\bname\s*=\s*["']?password\b"#).unwrap());

/// The site answers an expired or rejected session with its login form and
/// HTTP 200.
fn is_login_page(html: &str) -> bool {
    PASSWORD_INPUT_RE.is_match(html)
}

fn has_county_links(html: &str) -> bool {
    html.contains("munilink_")
}

/// Logged-in HTTP client; the session cookie lives in its cookie store.
pub struct Session {
    client: reqwest::Client,
    base_url: String,
}

impl Session {
    pub async fn login(settings: &Settings) -> Result<Self> {
        let (email, password) = settings.credentials()?;
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = settings.base_url.trim_end_matches('/').to_string();

        info!("Logging in to {}", base_url);
        let response = client
            .post(format!("{}/login.php", base_url))
            .form(&[
                ("action", "login"),
                ("redirect", "pro_update.php"),
                ("EMAIL", email),
                ("PASSWORD", password),
            ])
            .send()
            .await
            .context("Login request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Login rejected with HTTP {}", status);
        }
        let body = response.text().await.context("Failed to read login response")?;
        if is_login_page(&body) {
            anyhow::bail!("Login rejected: the site served the login form again");
        }
        Ok(Session { client, base_url })
    }

    pub fn url(&self, link: &str) -> String {
        format!("{}{}", self.base_url, link)
    }

    /// The production-report page listing every county, township and permit.
    pub async fn fetch_index(&self) -> Result<String> {
        let url = self.url(INDEX_PATH);
        info!("Fetching production index: {}", url);
        let page = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .context("Failed to read production index")?;
        if is_login_page(&page) {
            anyhow::bail!("Production index redirected to the login form; session not accepted");
        }
        if !has_county_links(&page) {
            anyhow::bail!("Production index has no county links");
        }
        Ok(page)
    }
}

pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Fetch well reports concurrently, saving each page to DB as it arrives.
pub async fn fetch_reports_streaming(
    conn: &Connection,
    session: Arc<Session>,
    wells: Vec<QueuedWell>,
    concurrency: usize,
) -> Result<FetchStats> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = wells.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<PageRow>(concurrency.max(1) * 2);

    for well in wells {
        let session = Arc::clone(&session);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let url = session.url(&well.link);
            let row = match sem.acquire().await {
                Ok(_permit) => fetch_with_retry(&session, well.well_pk, &url, &well.well_name).await,
                Err(e) => error_row(well.well_pk, url, e.to_string(), None),
            };
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every task has sent its row
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    let mut insert_stmt = conn.prepare(
        "INSERT INTO report_pages (well_pk, url, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut update_stmt = conn.prepare(
        "UPDATE wells SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        save_one(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} reports ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

fn save_one(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &PageRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.well_pk, row.url, row.html, row.status, row.error, row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.well_pk])?;
    Ok(())
}

fn should_retry(status: Option<u16>) -> bool {
    matches!(status, Some(429) | Some(500..=599))
}

async fn fetch_with_retry(session: &Session, well_pk: i64, url: &str, well_name: &str) -> PageRow {
    let mut attempt = 0;
    loop {
        let row = fetch_one(session, well_pk, url).await;
        if !should_retry(row.status) || attempt == MAX_RETRIES {
            if let Some(e) = &row.error {
                warn!("Fetch failed for {}: {}", well_name, e);
            }
            return row;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "HTTP {:?} on {} (attempt {}/{}), backing off {:.1}s",
            row.status,
            well_name,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

async fn fetch_one(session: &Session, well_pk: i64, url: &str) -> PageRow {
    let start = Instant::now();
    let response = session.client.get(url).send().await;
    let elapsed = || Some(start.elapsed().as_millis() as i64);

    let response = match response {
        Ok(r) => r,
        Err(e) => return error_row(well_pk, url.to_string(), e.to_string(), elapsed()),
    };
    let status = response.status();
    if !status.is_success() {
        let mut row = error_row(well_pk, url.to_string(), format!("HTTP {}", status), elapsed());
        row.status = Some(status.as_u16());
        return row;
    }
    match response.text().await {
        Ok(html) if is_login_page(&html) => {
            let mut row = error_row(well_pk, url.to_string(), LOGIN_PAGE_ERROR.into(), elapsed());
            row.status = Some(status.as_u16());
            row
        }
        Ok(html) => PageRow {
            well_pk,
            url: url.to_string(),
            html: Some(html),
            status: Some(status.as_u16()),
            error: None,
            latency_ms: elapsed(),
        },
        Err(e) => {
            let mut row = error_row(well_pk, url.to_string(), e.to_string(), elapsed());
            row.status = Some(status.as_u16());
            row
        }
    }
}

fn error_row(well_pk: i64, url: String, error: String, latency_ms: Option<i64>) -> PageRow {
    PageRow {
        well_pk,
        url,
        html: None,
        status: None,
        error: Some(error),
        latency_ms,
    }
}

// ── Tests ──
