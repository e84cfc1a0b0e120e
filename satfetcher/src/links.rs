//! Reference page discovery for catalog objects.
//!
//! For every international designator three candidate pages are built (NSSDC,
//! Celestrak, Wikipedia) and validated against their content. Checks run on a
//! bounded pool of tasks; each finished check is sent over a channel to a single
//! collector task that owns the result list and the progress counter.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use satstore::config::LinksSection;
use satstore::models::LinkRecord;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::http::{HttpSource, Page};

static NON_ID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d-]+").unwrap());
static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static CONTENT_WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div[^>]*\bid\s*=\s*["']contentwrapper["'][^>]*>(.*?)</div>"#).unwrap()
});

/// Outcome of validating one candidate page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Valid,
    Invalid,
    /// The page could not be fetched within the retry budget.
    Unknown,
}

/// Validation results for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkEntry {
    pub id: String,
    pub nssdc: LinkStatus,
    pub celestrak: LinkStatus,
    pub wikipedia: LinkStatus,
}

/// `id` with everything but digits and `-` removed.
pub fn clean_id(id: &str) -> String {
    NON_ID_CHARS.replace_all(id, "").into_owned()
}

/// Base URLs of the three reference sites.
#[derive(Debug, Clone)]
pub struct LinkTargets {
    pub nssdc: String,
    pub celestrak: String,
    pub wikipedia: String,
}

impl Default for LinkTargets {
    fn default() -> Self {
        Self {
            nssdc: "https://nssdc.gsfc.nasa.gov/nmc/spacecraft/display.action?id=".to_string(),
            celestrak: "https://celestrak.org/satcat".to_string(),
            wikipedia: "https://en.wikipedia.org/wiki/".to_string(),
        }
    }
}

impl LinkTargets {
    pub fn nssdc_link(&self, id: &str) -> String {
        format!("{}{}", self.nssdc, id)
    }

    pub fn celestrak_link(&self, id: &str) -> String {
        let year = id.split('-').next().unwrap_or_default();
        format!("{}/{}/{}.php", self.celestrak, year, clean_id(id))
    }

    pub fn wikipedia_link(&self, id: &str) -> String {
        format!("{}{}", self.wikipedia, id)
    }

    /// Keeps the links of pages that validated.
    pub fn to_record(&self, entry: &LinkEntry) -> LinkRecord {
        let keep = |status: LinkStatus, link: String| (status == LinkStatus::Valid).then_some(link);
        LinkRecord {
            obj_no: entry.id.clone(),
            nssdc: keep(entry.nssdc, self.nssdc_link(&entry.id)),
            celestrak: keep(entry.celestrak, self.celestrak_link(&entry.id)),
            wikipedia: keep(entry.wikipedia, self.wikipedia_link(&entry.id)),
        }
    }
}

fn page_title(body: &str) -> Option<&str> {
    TITLE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// NSSDC answers unknown ids with an error page, so the title must not say
/// `Error` and the content wrapper has to mention the id.
pub fn nssdc_valid(id: &str, page: &Page) -> bool {
    if page_title(&page.body).is_some_and(|title| title.contains("Error")) {
        return false;
    }
    CONTENT_WRAPPER
        .captures(&page.body)
        .and_then(|caps| caps.get(1))
        .is_some_and(|content| content.as_str().contains(id))
}

pub fn celestrak_valid(id: &str, page: &Page) -> bool {
    let clean = clean_id(id);
    !clean.is_empty() && page_title(&page.body).is_some_and(|title| title.contains(&clean))
}

pub fn wikipedia_valid(_id: &str, page: &Page) -> bool {
    page.status == 200
}

/// Satellite ids: the first whitespace separated token of every SATCAT line.
pub fn ids_from_satcat(content: &[u8], limit: Option<usize>) -> Vec<String> {
    String::from_utf8_lossy(content)
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[derive(Debug, Clone)]
pub struct LinkChecker {
    http: HttpSource,
    targets: LinkTargets,
    workers: usize,
    launch_delay: Duration,
}

impl LinkChecker {
    pub fn new(http: HttpSource, links: &LinksSection) -> Self {
        Self {
            http,
            targets: LinkTargets::default(),
            workers: links.workers.max(1),
            launch_delay: Duration::from_millis(links.launch_delay_ms),
        }
    }

    pub fn with_targets(mut self, targets: LinkTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn targets(&self) -> &LinkTargets {
        &self.targets
    }

    async fn validate(&self, url: &str, id: &str, check: fn(&str, &Page) -> bool) -> LinkStatus {
        match self.http.get_page(url).await {
            Ok(page) if check(id, &page) => LinkStatus::Valid,
            Ok(_) => LinkStatus::Invalid,
            Err(e) => {
                log::warn!("Could not validate {}: {}", url, e);
                LinkStatus::Unknown
            }
        }
    }

    pub async fn check_one(&self, id: &str) -> LinkEntry {
        let nssdc = self
            .validate(&self.targets.nssdc_link(id), id, nssdc_valid)
            .await;
        let celestrak = self
            .validate(&self.targets.celestrak_link(id), id, celestrak_valid)
            .await;
        let wikipedia = self
            .validate(&self.targets.wikipedia_link(id), id, wikipedia_valid)
            .await;
        LinkEntry {
            id: id.to_string(),
            nssdc,
            celestrak,
            wikipedia,
        }
    }

    /// Checks all `ids` with at most `workers` checks in flight. Results are sorted by id.
    pub async fn check_all(&self, ids: Vec<String>) -> Vec<LinkEntry> {
        let total = ids.len();
        let (tx, mut rx) = mpsc::channel::<LinkEntry>(self.workers * 2);

        let collector = tokio::spawn(async move {
            let mut results = Vec::with_capacity(total);
            while let Some(entry) = rx.recv().await {
                results.push(entry);
                log::debug!("Processed {}/{} satellites.", results.len(), total);
                if results.len() % 100 == 0 {
                    log::info!("Processed {}/{} satellites.", results.len(), total);
                }
            }
            results
        });

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for (idx, id) in ids.into_iter().enumerate() {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let checker = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let entry = checker.check_one(&id).await;
                drop(permit);
                if tx.send(entry).await.is_err() {
                    log::error!("Link collector stopped before {} was reported", id);
                }
            });
            if idx + 1 < total && !self.launch_delay.is_zero() {
                tokio::time::sleep(self.launch_delay).await;
            }
        }
        drop(tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                log::error!("Link check task failed: {}", e);
            }
        }

        let mut results = match collector.await {
            Ok(results) => results,
            Err(e) => {
                log::error!("Link collector failed: {}", e);
                Vec::new()
            }
        };
        results.sort_by(|a, b| a.id.cmp(&b.id));
        log::info!("Checked links for {} of {} satellites.", results.len(), total);
        results
    }
}
