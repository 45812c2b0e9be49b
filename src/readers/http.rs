//! Fetch data over HTTP(S)
//!
//! The [`HttpReader`] trait is the only interface the connector has to
//! the network. The catalog fetcher and the feed retrieval go through
//! it, which also allows the tests to run against an in-memory reader.

use log::{debug, trace};

use crate::errors::ConnectorError;
use crate::models::reqres::HttpResponse;

/// A trait to have a common interface between HTTP readers.
/// A reader performs one GET at a time, synchronously. The total count
/// needed to stop the catalog pagination is only known after the first
/// page returns, so there is nothing to gain from concurrent requests.
pub trait HttpReader {
    /// Sends a GET request and returns the whole response.
    /// A transport failure is fatal for the in-flight call.
    fn get(&self, url: &str) -> Result<HttpResponse, ConnectorError>;
}

/// A reader used to fetch HTTP(S) resources with a blocking client.
pub struct BlockingHttpReader {
    /// The client, reused across requests
    client: reqwest::blocking::Client,
}

impl BlockingHttpReader {
    /// Creates a new BlockingHttpReader
    pub fn new() -> Self {
        BlockingHttpReader {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl HttpReader for BlockingHttpReader {
    /// Reads one resource via HTTP(S)
    fn get(&self, url: &str) -> Result<HttpResponse, ConnectorError> {
        trace!("Running BlockingHttpReader::get()");
        debug!("Sending a GET request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?
            .to_vec();
        debug!("Received a response with status {}", status);
        Ok(HttpResponse::new(status, body))
    }
}
