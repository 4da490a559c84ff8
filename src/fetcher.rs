use std::path::{Path, PathBuf};
use std::time::Duration;

use scraper::{ElementRef, Html, Node};
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::planner::DateWindow;

const BASE_URL: &str = "https://www.google.com/travel/flights";
const CONSENT_MARKER: &str = "Before you continue to Google";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Elements whose text is never shown.
const HIDDEN: [&str; 4] = ["script", "style", "noscript", "template"];

/// Elements that start a new line of text.
const BLOCKS: [&str; 22] = [
    "br", "div", "p", "li", "ul", "ol", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6",
    "button", "section", "article", "header", "footer", "main", "nav",
];

/// Everything needed to query one window.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub origin: &'a str,
    pub destination: &'a str,
    pub window: DateWindow,
    pub country: &'a str,
    pub currency: &'a str,
}

impl FetchRequest<'_> {
    pub fn url(&self) -> String {
        let leave = self.window.leave().format("%Y-%m-%d");
        match self.window.ret() {
            Some(ret) => format!(
                "{BASE_URL}?q=Flights%20to%20{}%20from%20{}%20from%20{}%20to%20{}&curr={}&gl={}",
                self.destination,
                self.origin,
                leave,
                ret.format("%Y-%m-%d"),
                self.currency,
                self.country
            ),
            None => format!(
                "{BASE_URL}?q=Flights%20to%20{}%20from%20{}%20on%20{}%20oneway&curr={}&gl={}",
                self.destination, self.origin, leave, self.currency, self.country
            ),
        }
    }

    /// `JFK-MIA-2024-03-15.txt` or `JFK-MIA-2024-03-15_2024-03-22.txt`.
    pub fn dump_name(&self) -> String {
        match self.window.ret() {
            Some(ret) => format!("{}-{}-{}_{}.txt", self.origin, self.destination, self.window.leave(), ret),
            None => format!("{}-{}-{}.txt", self.origin, self.destination, self.window.leave()),
        }
    }
}

/// Source of the flattened result text for one window.
///
/// Returned lines are already normalized (see [`normalize_lines`]).
pub trait PageFetcher {
    fn fetch(&mut self, req: &FetchRequest<'_>) -> Result<Vec<String>>;
}

/// Drop non-ASCII characters, trim, and skip blank lines.
pub fn normalize_lines<'a, I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    raw.into_iter()
        .map(|l| l.chars().filter(char::is_ascii).collect::<String>().trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Flatten an HTML page to its visible text, one block per line.
pub fn flatten_html(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut text = String::new();
    collect_text(document.root_element(), &mut text);
    normalize_lines(text.lines())
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    if HIDDEN.contains(&name) {
        return;
    }
    let block = BLOCKS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            collect_text(child_el, out);
        } else if let Node::Text(t) = child.value() {
            // no-break spaces separate words; other non-ASCII is dropped later
            out.extend(t.chars().map(|c| if c == '\u{a0}' { ' ' } else { c }));
        }
    }
    if block {
        out.push('\n');
    }
}

/// Blocking HTTP fetch of the results page.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ScrapeError::Fetch(format!("http client: {e}")))?;
        Ok(HttpFetcher { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&mut self, req: &FetchRequest<'_>) -> Result<Vec<String>> {
        let url = req.url();
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                ScrapeError::FetchTimeout { url: url.clone() }
            } else {
                ScrapeError::Fetch(format!("{url}: {e}"))
            }
        };

        let body = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(map_err)?;

        if body.contains(CONSENT_MARKER) {
            return Err(ScrapeError::Fetch(format!("{url}: consent page returned")));
        }

        let lines = flatten_html(&body);
        debug!(url = %url, lines = lines.len(), "fetched");
        Ok(lines)
    }
}

/// Replays line dumps saved under `dir`, one file per window.
pub struct DumpFetcher {
    dir: PathBuf,
}

impl DumpFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DumpFetcher { dir: dir.into() }
    }
}

impl PageFetcher for DumpFetcher {
    fn fetch(&mut self, req: &FetchRequest<'_>) -> Result<Vec<String>> {
        let path = self.dir.join(req.dump_name());
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(normalize_lines(raw.lines())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ScrapeError::FetchTimeout {
                url: path.display().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Save a window's lines so it can be replayed with [`DumpFetcher`].
pub fn write_dump(dir: &Path, req: &FetchRequest<'_>, lines: &[String]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(req.dump_name());
    std::fs::write(&path, lines.join("\n"))?;
    Ok(path)
}

// ── Tests ──
