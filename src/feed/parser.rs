//! The streaming parser of the vulnerability feed.
//!
//! The feed is a single cumulative document listing every finding ever
//! reported for a site. The parser walks it event by event and turns it
//! into one chronological timeline per finding, plus the global set of
//! distinct observation dates. Memory stays proportional to the number
//! of findings and dates, not to the size of the document.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use log::{debug, trace, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::errors::ConnectorError;
use crate::models::{FindingKey, FindingStatus, FindingTimeline, TimelineEntry};

/// Represents the parsing variant.
/// It is selected once, when the parser is configured, from the
/// per-target "source numbers already matched" flag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParseStrategy {
    /// Each finding entry carries attack vectors, each contributing an
    /// implicit "open at discovery" observation plus an explicit retest
    /// observation. A finding starts open and must be explicitly
    /// confirmed closed.
    Independent,
    /// The provider already resolved the state per entry into a single
    /// ground-truth observation, dated at midnight to collapse same-day
    /// observations.
    Matched,
}

impl ParseStrategy {
    /// Selects the strategy from the target configuration flag
    pub fn from_matched_flag(source_numbers_matched: bool) -> Self {
        if source_numbers_matched {
            ParseStrategy::Matched
        } else {
            ParseStrategy::Independent
        }
    }
}

/// Represents the complete output of one feed parse.
pub struct ParsedFeed {
    /// One timeline per distinct finding, in order of first appearance
    pub timelines: Vec<FindingTimeline>,
    /// The distinct observation dates seen across every timeline,
    /// deduplicated and sorted ascending
    pub cut_points: BTreeSet<DateTime<Utc>>,
}

impl ParsedFeed {
    /// Whether the feed yielded no finding at all.
    /// An empty feed is not an error, the caller can skip the target.
    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }
}

/// The accumulator for the finding entry being parsed
struct EntryState {
    /// The provider identifier, kept for display
    display_id: Option<String>,
    /// The class of vulnerability
    vuln_class: Option<String>,
    /// The severity reported by the provider
    severity: Option<String>,
    /// A link back to the finding on the provider side
    url_reference: Option<String>,
    /// The path of the attacked URL
    path: Option<String>,
    /// The name of the attacked parameter
    parameter: Option<String>,
    /// The markup accumulated verbatim for audit
    raw: String,
    /// The observations waiting for the entry (or sub-event) to close
    pending: Vec<TimelineEntry>,
}

/// Collects timelines keyed by finding identity
struct TimelineCollector {
    /// The timelines, in order of first appearance
    timelines: Vec<FindingTimeline>,
    /// Maps a finding identity to its position in the list
    index: HashMap<FindingKey, usize>,
}

impl TimelineCollector {
    fn new() -> Self {
        TimelineCollector {
            timelines: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Appends observations to the timeline of the given identity,
    /// creating the timeline on first use. The identity attributes of
    /// the first occurrence win.
    fn append(&mut self, key: FindingKey, state: &EntryState, entries: Vec<TimelineEntry>) {
        if let Some(&position) = self.index.get(&key) {
            self.timelines[position].entries.extend(entries);
            return;
        }
        let mut timeline = FindingTimeline::new(
            key.clone(),
            state.severity.clone(),
            state.display_id.clone(),
            state.url_reference.clone(),
            format!("{}</vulnerability>", state.raw),
        );
        timeline.entries = entries;
        self.index.insert(key, self.timelines.len());
        self.timelines.push(timeline);
    }
}

/// The streaming feed parser.
/// One instance parses one variant; the regexes are compiled once so
/// the parser can be reused across feeds.
pub struct FeedParser {
    /// The parsing variant
    strategy: ParseStrategy,
    /// The base URL of the provider, used to build URL references
    base_url: String,
    /// The regex used to extract the path component of a URL
    url_regex: Regex,
}

impl FeedParser {
    /// Creates a new FeedParser
    pub fn new(strategy: ParseStrategy, base_url: &str) -> Self {
        // Note: this regex is not exhaustive. It doesn't support the
        // user:pass@hostname form, and it ignores the hash (#anchor1)
        // But it should be enough for what we have to do with it.
        let url_regex = Regex::new(
            r"(?P<protocol>[a-z0-9]+):\/\/(?P<hostname>[^\/:]+)(:(?P<port>\d{1,5}))?(?P<path>\/[^\?#]*)?",
        )
        .unwrap();
        FeedParser {
            strategy,
            base_url: base_url.trim_end_matches('/').to_string(),
            url_regex,
        }
    }

    /// Parses a whole feed document.
    /// A structurally malformed document is fatal. A bad URL or date on
    /// an individual entry is recovered locally and the parse continues.
    pub fn parse<R: std::io::BufRead>(&self, input: R) -> Result<ParsedFeed, ConnectorError> {
        trace!("Running FeedParser::parse()");
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);

        // The collections are owned by this single parse call, there is
        // nothing to reset between documents
        let mut collector = TimelineCollector::new();
        let mut cut_points: BTreeSet<DateTime<Utc>> = BTreeSet::new();
        let mut entry: Option<EntryState> = None;
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| ConnectorError::FeedParse(e.to_string()))?;
            match event {
                Event::Start(e) => {
                    self.open_element(&e, false, &mut entry, &mut collector, &mut cut_points)
                }
                Event::Empty(e) => {
                    self.open_element(&e, true, &mut entry, &mut collector, &mut cut_points)
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.close_element(&name, &mut entry, &mut collector);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        debug!(
            "Feed parsed: {} finding(s), {} distinct observation date(s)",
            collector.timelines.len(),
            cut_points.len()
        );
        Ok(ParsedFeed {
            timelines: collector.timelines,
            cut_points,
        })
    }

    /// Handles an opening (or self-closing) element
    fn open_element(
        &self,
        element: &BytesStart,
        self_closing: bool,
        entry: &mut Option<EntryState>,
        collector: &mut TimelineCollector,
        cut_points: &mut BTreeSet<DateTime<Utc>>,
    ) {
        match element.name().as_ref() {
            b"vulnerabilities" => {}
            b"vulnerability" => {
                let mut state = self.begin_entry(element);
                if self.strategy == ParseStrategy::Matched {
                    self.read_matched_observation(element, &mut state, cut_points);
                    if self_closing {
                        self.finish_entry(&mut state, collector);
                        return;
                    }
                } else if self_closing {
                    // An entry without attack vectors contributes nothing
                    debug!("A finding entry without attack vectors was skipped");
                    return;
                }
                *entry = Some(state);
            }
            b"attack_vector" if self.strategy == ParseStrategy::Independent => {
                if let Some(state) = entry.as_mut() {
                    state.raw.push_str(&make_tag(element));
                    // The path and parameter belong to the sub-event
                    state.path = None;
                    state.parameter = None;
                    self.read_vector_observations(element, state, cut_points);
                    if self_closing {
                        self.finish_entry(state, collector);
                    }
                }
            }
            b"request" => {
                if let Some(state) = entry.as_mut() {
                    state.raw.push_str(&make_tag(element));
                    if let Some(url) = attribute(element, "url") {
                        state.path = Some(self.extract_path(&url));
                    }
                }
            }
            b"param" => {
                if let Some(state) = entry.as_mut() {
                    state.raw.push_str(&make_tag(element));
                    state.parameter = attribute(element, "name");
                }
            }
            _ => {
                if let Some(state) = entry.as_mut() {
                    state.raw.push_str(&make_tag(element));
                }
            }
        }
    }

    /// Handles a closing element
    fn close_element(
        &self,
        name: &str,
        entry: &mut Option<EntryState>,
        collector: &mut TimelineCollector,
    ) {
        match name {
            "attack_vector" if self.strategy == ParseStrategy::Independent => {
                if let Some(state) = entry.as_mut() {
                    state.raw.push_str("</attack_vector>");
                    self.finish_entry(state, collector);
                }
            }
            "vulnerability" => {
                if let Some(mut state) = entry.take() {
                    if self.strategy == ParseStrategy::Matched {
                        self.finish_entry(&mut state, collector);
                    }
                }
            }
            _ => {
                if let Some(state) = entry.as_mut() {
                    state.raw.push_str(&format!("</{}>", name));
                }
            }
        }
    }

    /// Starts accumulating a finding entry from its attributes
    fn begin_entry(&self, element: &BytesStart) -> EntryState {
        let display_id = attribute(element, "id");
        let site_id = attribute(element, "site");
        let url_reference = match (&site_id, &display_id) {
            (Some(site), Some(vuln)) => Some(format!(
                "{}?site_id={}&vuln_id={}",
                self.base_url, site, vuln
            )),
            _ => None,
        };
        EntryState {
            display_id,
            vuln_class: attribute(element, "class"),
            severity: attribute(element, "severity"),
            url_reference,
            path: None,
            parameter: None,
            raw: format!("{}\n", make_tag(element)),
            pending: Vec::new(),
        }
    }

    /// Reads the single resolved observation of the matched variant.
    /// The date is normalized to midnight so same-day observations
    /// collapse into one cut point.
    fn read_matched_observation(
        &self,
        element: &BytesStart,
        state: &mut EntryState,
        cut_points: &mut BTreeSet<DateTime<Utc>>,
    ) {
        if let Some(url) = attribute(element, "url") {
            state.path = Some(self.extract_path(&url));
        }
        let status = attribute(element, "status").unwrap_or_default();
        let found = self
            .parse_datetime(attribute(element, "found").as_deref())
            .map(at_midnight);
        if let Some(date) = found {
            cut_points.insert(date);
        }
        state
            .pending
            .push(TimelineEntry::new(found, FindingStatus::from_provider(&status)));
    }

    /// Reads the two observations of an attack vector: the implicit
    /// "open at discovery" one and the explicit retest one.
    fn read_vector_observations(
        &self,
        element: &BytesStart,
        state: &mut EntryState,
        cut_points: &mut BTreeSet<DateTime<Utc>>,
    ) {
        let found = self.parse_datetime(attribute(element, "found").as_deref());
        let tested = self.parse_datetime(attribute(element, "tested").as_deref());
        let tested_state = attribute(element, "state").unwrap_or_default();

        if let Some(date) = found {
            cut_points.insert(date);
        }
        if let Some(date) = tested {
            cut_points.insert(date);
        }

        // Every finding starts open at discovery, closure has to be
        // confirmed by the retest observation
        state
            .pending
            .push(TimelineEntry::new(found, FindingStatus::Open));
        state.pending.push(TimelineEntry::new(
            tested,
            FindingStatus::from_provider(&tested_state),
        ));
    }

    /// Closes the current entry (or sub-event): computes the identity
    /// key and appends the pending observations to its timeline.
    /// The key is fully established here, before any lookup happens.
    fn finish_entry(&self, state: &mut EntryState, collector: &mut TimelineCollector) {
        let pending: Vec<TimelineEntry> = state.pending.drain(..).collect();
        if pending.is_empty() {
            return;
        }
        if state.vuln_class.is_none() {
            warn!("A finding entry without a vulnerability class was skipped");
            return;
        }
        let key = FindingKey::new(
            state.vuln_class.as_ref().unwrap(),
            state.path.as_deref().unwrap_or("/"),
            state.parameter.as_deref(),
        );
        collector.append(key, state, pending);
    }

    /// Extracts the path component of a URL, defaulting to the root
    /// path when the URL cannot be parsed.
    fn extract_path(&self, full_url: &str) -> String {
        let with_scheme = if full_url.starts_with("http") {
            full_url.to_string()
        } else {
            format!("http://{}", full_url)
        };
        let caps_result = self.url_regex.captures(&with_scheme);
        if caps_result.is_none() {
            warn!("Unable to parse a path out of the URL: {}", full_url);
            return "/".to_string();
        }
        let caps = caps_result.unwrap();
        let path = caps.name("path").map(|m| m.as_str()).unwrap_or("");
        if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        }
    }

    /// Parses a provider date.
    /// A missing or unparseable date degrades to None, the observation
    /// will be excluded from comparisons and snapshot boundaries.
    fn parse_datetime(&self, raw: Option<&str>) -> Option<DateTime<Utc>> {
        if raw.is_none() {
            warn!("An observation has no date, it is excluded from snapshot boundaries");
            return None;
        }
        let raw = raw.unwrap();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Some(Utc.from_utc_datetime(&ndt));
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
        warn!(
            "Unable to parse the observation date \"{}\", it is excluded from snapshot boundaries",
            raw
        );
        None
    }
}

/// Truncates a timestamp to the midnight of its day
fn at_midnight(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&timestamp.date_naive().and_time(NaiveTime::MIN))
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

/// Rebuilds the markup of an opening tag, for the audit fragment
fn make_tag(element: &BytesStart) -> String {
    let mut tag = format!("<{}", String::from_utf8_lossy(element.name().as_ref()));
    for attr in element.attributes().flatten() {
        tag.push_str(&format!(
            " {}=\"{}\"",
            String::from_utf8_lossy(attr.key.as_ref()),
            String::from_utf8_lossy(&attr.value)
        ));
    }
    tag.push('>');
    tag
}
