//! This module contains the main structure and logic for the whole
//! application.

use clap::Parser;
use log::{debug, info, trace, warn};

use crate::catalog::CatalogFetcher;
use crate::errors::ConnectorError;
use crate::feed;
use crate::feed::parser::{FeedParser, ParseStrategy};
use crate::models::Writers;
use crate::readers::http::BlockingHttpReader;
use crate::reconstruct::reconstruct_scans;
use crate::writers::json::JsonWriter;
use crate::writers::textstdout::TextStdoutWriter;
use crate::writers::Writer;

/// Represents the application
pub struct Application {
    /// The arguments given on the command line.
    argv: Option<Args>,
}

impl Application {
    /// Creates a new application
    pub fn new() -> Self {
        trace!("In Application::new()");
        Application { argv: None }
    }

    /// Read argv to get the arguments before running the application
    pub fn read_argv(&mut self) {
        trace!("In Application::read_argv()");
        let args = Args::parse();
        debug!(
            "Site = {:?}, matched = {}, base URL = {}",
            args.site, args.matched, args.base_url
        );
        self.argv = Some(args);
    }

    /// Runs the global application
    /// read_argv() MUST have been called before
    pub fn run(&self) -> Result<(), ConnectorError> {
        trace!("Running Application::run()");
        let args = self
            .argv
            .as_ref()
            .expect("CLI arguments haven't been read.");

        let reader = BlockingHttpReader::new();
        let fetcher = CatalogFetcher::new(&reader, &args.base_url, &args.api_key);

        // Without a site, just list the catalog and stop
        if args.site.is_none() {
            info!("No site provided, listing the catalog");
            let entries = fetcher.fetch_all()?;
            for entry in entries {
                println!("{}\t{}", entry.external_id, entry.display_name);
            }
            return Ok(());
        }

        let site = args.site.as_ref().unwrap();
        let site_id = fetcher.resolve_site_id(site)?;
        info!("Retrieved site ID {} for site {}", site_id, site);

        let body = feed::retrieve(&reader, &args.base_url, &args.api_key, &site_id)?;
        let parser = FeedParser::new(
            ParseStrategy::from_matched_flag(args.matched),
            &args.base_url,
        );
        let parsed = parser.parse(body.as_slice())?;

        // An empty feed is not an error, the site simply has no history
        // to reconstruct and a batch caller can move on to the next one
        if parsed.is_empty() {
            warn!("No finding was parsed from the feed, nothing to reconstruct");
            return Ok(());
        }

        let snapshots = reconstruct_scans(&parsed.timelines, &parsed.cut_points);
        if snapshots.is_empty() {
            warn!("No scan could be reconstructed, returning nothing");
            return Ok(());
        }
        info!("{} scan(s) successfully reconstructed", snapshots.len());

        let writer: Box<dyn Writer> = match args.writer {
            Writers::TextStdout => Box::new(TextStdoutWriter::new(site)),
            Writers::Json => Box::new(JsonWriter::new(site)),
        };
        writer.write(&snapshots);
        Ok(())
    }
}

/// Represents the CLI arguments accepted by the connector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The API key of the account on the remote provider
    #[arg(short = 'k', long, value_name = "API_KEY")]
    pub api_key: String,
    /// The display name of the site to reconstruct the scans of.
    /// When omitted, the site catalog is listed instead.
    #[arg(short, long, value_name = "SITE")]
    pub site: Option<String>,
    /// Whether the provider already matched the source numbers.
    /// It selects the variant used to parse the feed.
    #[arg(short, long, default_value_t = false)]
    pub matched: bool,
    /// The base URL of the provider API
    #[arg(
        short,
        long,
        value_name = "BASE_URL",
        default_value = "https://sentinel.whitehatsec.com/api"
    )]
    pub base_url: String,
    /// The writer to use
    #[arg(short, long, value_name = "WRITER", default_value = "textstdout")]
    pub writer: Writers,
}
