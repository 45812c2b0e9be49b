//! The site catalog fetcher.
//! This module retrieves the paginated list of monitored sites for an
//! account, and resolves a site display name into the identifier the
//! feed endpoint expects.

use log::{debug, error, info, trace, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::ConnectorError;
use crate::models::CatalogEntry;
use crate::readers::http::HttpReader;

/// The number of sites requested per catalog page
pub const PAGE_LIMIT: usize = 1000;

/// One parsed catalog page
struct CatalogPage {
    /// The sites listed on the page
    entries: Vec<CatalogEntry>,
    /// The total number of sites the server reports for the account
    total_sites: usize,
}

/// The fetcher of the site catalog.
/// Pages are requested one at a time until the accumulated entries
/// reach the total count reported by the server.
pub struct CatalogFetcher<'a> {
    /// The reader used to perform the requests
    reader: &'a dyn HttpReader,
    /// The base URL of the provider API
    base_url: String,
    /// The API key of the account
    api_key: String,
}

impl<'a> CatalogFetcher<'a> {
    /// Creates a new CatalogFetcher
    pub fn new(reader: &'a dyn HttpReader, base_url: &str, api_key: &str) -> Self {
        CatalogFetcher {
            reader,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Fetches the full list of monitored sites for the account.
    /// A non-success response on any page is fatal for the whole call,
    /// the pages already accumulated are discarded.
    pub fn fetch_all(&self) -> Result<Vec<CatalogEntry>, ConnectorError> {
        trace!("Running CatalogFetcher::fetch_all()");
        let mut entries: Vec<CatalogEntry> = Vec::new();
        let mut page_offset = 0;

        loop {
            let url = format!(
                "{}/site/?key={}&page:limit={}&page:offset={}",
                self.base_url, self.api_key, PAGE_LIMIT, page_offset
            );
            debug!("Requesting the catalog page at offset {}", page_offset);
            let response = self.reader.get(&url)?;
            if !response.is_valid() {
                error!(
                    "Unable to retrieve the site catalog, response status: {}",
                    response.status
                );
                return Err(ConnectorError::RemoteIo {
                    status: response.status,
                    context: "retrieving the site catalog".to_string(),
                });
            }

            let page = parse_catalog_page(&response.body)?;
            debug!(
                "Catalog page parsed, {} site(s) on the page, {} in total",
                page.entries.len(),
                page.total_sites
            );
            // A page without any entry while sites are still expected
            // means the server stopped short of its own total. Bailing
            // out keeps the offset from advancing forever.
            if page.entries.is_empty() && page.total_sites > entries.len() {
                error!(
                    "The catalog page at offset {} is empty but the server reports {} site(s), aborting",
                    page_offset, page.total_sites
                );
                return Err(ConnectorError::CatalogParse(format!(
                    "the page at offset {} lists no site while {} are expected",
                    page_offset, page.total_sites
                )));
            }
            entries.extend(page.entries);
            page_offset += PAGE_LIMIT;

            if entries.len() >= page.total_sites {
                break;
            }
        }

        info!("Retrieved {} site(s) from the catalog", entries.len());
        Ok(entries)
    }

    /// Resolves a site display name into its identifier on the provider
    /// side. The whole catalog is fetched, there is no server-side search.
    pub fn resolve_site_id(&self, display_name: &str) -> Result<String, ConnectorError> {
        trace!("Running CatalogFetcher::resolve_site_id()");
        let entries = self.fetch_all()?;
        for entry in entries {
            if entry.display_name == display_name {
                return Ok(entry.external_id);
            }
        }
        warn!("No site named \"{}\" in the catalog", display_name);
        Err(ConnectorError::UnknownSite(display_name.to_string()))
    }
}

/// Reads an attribute value from an element, unescaped.
/// A missing or malformed attribute is treated as absent.
fn attribute(element: &BytesStart, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// Parses one page of the catalog document.
/// The structure is <sites><site id=".."><label>text</label></site>...
/// <total_sites>N</total_sites></sites>. The site identifier is an
/// attribute, the label and the total count are element text.
fn parse_catalog_page(body: &[u8]) -> Result<CatalogPage, ConnectorError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut entries: Vec<CatalogEntry> = Vec::new();
    let mut total_sites = 0;
    let mut current_id: Option<String> = None;
    let mut in_label = false;
    let mut in_total = false;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ConnectorError::CatalogParse(e.to_string()))?;
        match event {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"site" => current_id = attribute(&e, "id"),
                b"label" => {
                    in_label = true;
                    text.clear();
                }
                b"total_sites" => {
                    in_total = true;
                    text.clear();
                }
                _ => {}
            },
            Event::Text(t) => {
                if in_label || in_total {
                    let content = t
                        .unescape()
                        .map_err(|e| ConnectorError::CatalogParse(e.to_string()))?;
                    text.push_str(&content);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"label" => {
                    if let Some(id) = current_id.take() {
                        entries.push(CatalogEntry::new(&id, &text));
                    } else {
                        warn!("A site label without an id was skipped: {}", text);
                    }
                    in_label = false;
                }
                b"total_sites" => {
                    total_sites = match text.trim().parse() {
                        Ok(total) => total,
                        Err(_) => {
                            warn!("Unable to parse the total site count \"{}\", using 0", text);
                            0
                        }
                    };
                    in_total = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(CatalogPage {
        entries,
        total_sites,
    })
}
