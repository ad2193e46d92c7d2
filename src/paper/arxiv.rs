//! arXiv repository client.
//!
//! Looks papers up through the arXiv Atom API
//! (`http://export.arxiv.org/api/query?id_list=<id>`) and downloads their PDF.
//! No API key is required.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;
use reqwest::Client;
use tracing::debug;

use super::{PaperError, PaperRepository, PaperResult};
use crate::models::{Author, PaperMetadata, PaperReference};

/// Default arXiv Atom API endpoint.
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Default base URL for PDF downloads when an entry has no PDF link.
pub const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

const USER_AGENT: &str = concat!("paper-explain/", env!("CARGO_PKG_VERSION"));

/// Client for the arXiv API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: Client,
    api_url: String,
    pdf_base_url: String,
}

impl ArxivClient {
    /// Creates a client talking to the public arXiv endpoints.
    pub fn new() -> PaperResult<Self> {
        Self::with_endpoints(ARXIV_API_URL, ARXIV_PDF_URL)
    }

    /// Creates a client with custom API and PDF base URLs.
    pub fn with_endpoints(api_url: impl Into<String>, pdf_base_url: impl Into<String>) -> PaperResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PaperError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            pdf_base_url: pdf_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn pdf_url_for(&self, paper: &PaperMetadata) -> String {
        if let Some(url) = &paper.pdf_url {
            return url.clone();
        }
        let id = paper
            .entry_id
            .split_once("/abs/")
            .map(|(_, id)| id)
            .unwrap_or(paper.entry_id.as_str());
        format!("{}/{}", self.pdf_base_url, id)
    }
}

#[async_trait]
impl PaperRepository for ArxivClient {
    async fn lookup(&self, id: &PaperReference) -> PaperResult<PaperMetadata> {
        debug!("Fetching from arXiv via: {}?id_list={}", self.api_url, id);

        let body = self
            .client
            .get(&self.api_url)
            .query(&[("id_list", id.as_str()), ("max_results", "1")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_atom_feed(&body)?
            .into_iter()
            .find(|entry| !entry.entry_id.contains("/api/errors"))
            .ok_or_else(|| PaperError::NotFound(format!("No arXiv entry for '{}'", id)))
    }

    async fn download(&self, paper: &PaperMetadata, destination: &Path) -> PaperResult<()> {
        let url = self.pdf_url_for(paper);
        debug!("Downloading PDF from {}", url);

        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if !bytes.starts_with(b"%PDF") {
            return Err(PaperError::Parse(format!("Response from {} is not a PDF document", url)));
        }

        tokio::fs::write(destination, &bytes).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), destination.display());

        Ok(())
    }

    fn name(&self) -> &str {
        "arXiv"
    }
}

/// Per-entry accumulator for the Atom parser.
#[derive(Default)]
struct EntryAccum {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<Author>,
    pdf_url: Option<String>,
}

impl EntryAccum {
    fn into_metadata(self) -> Option<PaperMetadata> {
        if self.id.trim().is_empty() {
            return None;
        }
        Some(PaperMetadata {
            entry_id: self.id.trim().to_string(),
            title: collapse_whitespace(&self.title),
            authors: self
                .authors
                .into_iter()
                .map(|a| Author {
                    name: collapse_whitespace(&a.name),
                    affiliation: a.affiliation.map(|s| collapse_whitespace(&s)),
                })
                .collect(),
            summary: collapse_whitespace(&self.summary),
            published: Some(self.published.trim().to_string()).filter(|s| !s.is_empty()),
            pdf_url: self.pdf_url,
        })
    }

    fn push_text(&mut self, tag: &str, text: &str, in_author: bool) {
        match tag {
            "id" => self.id.push_str(text),
            "title" => self.title.push_str(text),
            "summary" => self.summary.push_str(text),
            "published" => self.published.push_str(text),
            "name" if in_author => {
                if let Some(author) = self.authors.last_mut() {
                    author.name.push_str(text);
                }
            }
            "arxiv:affiliation" if in_author => {
                if let Some(author) = self.authors.last_mut() {
                    author.affiliation.get_or_insert_with(String::new).push_str(text);
                }
            }
            _ => {}
        }
    }
}

/// Atom XML state machine for arXiv feeds.
#[derive(Default)]
struct AtomParser {
    entries: Vec<PaperMetadata>,
    accum: EntryAccum,
    current_tag: String,
    in_entry: bool,
    in_author: bool,
}

impl AtomParser {
    fn handle_start(&mut self, e: &BytesStart<'_>) {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        match tag.as_str() {
            "entry" => {
                self.in_entry = true;
                self.accum = EntryAccum::default();
            }
            "author" if self.in_entry => {
                self.in_author = true;
                self.accum.authors.push(Author {
                    name: String::new(),
                    affiliation: None,
                });
            }
            "link" if self.in_entry => self.handle_link(e),
            _ if self.in_entry => self.current_tag = tag,
            _ => {}
        }
    }

    fn handle_empty(&mut self, e: &BytesStart<'_>) {
        if self.in_entry && e.name().as_ref() == b"link" {
            self.handle_link(e);
        }
    }

    fn handle_link(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut is_pdf = false;
        for attr in e.attributes().flatten() {
            let value = String::from_utf8_lossy(&attr.value).to_string();
            match attr.key.as_ref() {
                b"href" => href = Some(value),
                b"title" => is_pdf |= value == "pdf",
                b"type" => is_pdf |= value == "application/pdf",
                _ => {}
            }
        }
        if is_pdf {
            if let Some(href) = href.filter(|h| !h.is_empty()) {
                self.accum.pdf_url = Some(href);
            }
        }
    }

    fn handle_text(&mut self, e: &BytesText<'_>) -> PaperResult<()> {
        if !self.in_entry || self.current_tag.is_empty() {
            return Ok(());
        }
        let text = e
            .unescape()
            .map_err(|err| PaperError::Parse(format!("Invalid text in arXiv feed: {}", err)))?;
        self.accum.push_text(&self.current_tag, &text, self.in_author);
        Ok(())
    }

    fn handle_end(&mut self, e: &BytesEnd<'_>) {
        match e.name().as_ref() {
            b"entry" => {
                let finished = std::mem::take(&mut self.accum);
                if let Some(entry) = finished.into_metadata() {
                    self.entries.push(entry);
                }
                self.in_entry = false;
                self.current_tag.clear();
            }
            b"author" => self.in_author = false,
            _ => self.current_tag.clear(),
        }
    }
}

/// Parses an arXiv Atom feed into paper metadata, one item per `<entry>`.
///
/// # Errors
/// Returns `PaperError::Parse` if the document is not well-formed XML
pub fn parse_atom_feed(xml: &str) -> PaperResult<Vec<PaperMetadata>> {
    let mut reader = Reader::from_str(xml);
    let mut parser = AtomParser::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => parser.handle_start(e),
            Ok(Event::Empty(ref e)) => parser.handle_empty(e),
            Ok(Event::Text(ref e)) => parser.handle_text(e)?,
            Ok(Event::End(ref e)) => parser.handle_end(e),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PaperError::Parse(format!(
                    "Malformed arXiv feed at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(parser.entries)
}

/// Collapse consecutive whitespace into a single space.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
