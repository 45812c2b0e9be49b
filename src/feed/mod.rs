//! This module handles the vulnerability feed of a site: retrieving it
//! from the remote provider, parsing it into finding timelines and
//! computing the identity of the findings.

pub mod identity;
pub mod parser;

use log::{debug, error, trace};

use crate::errors::ConnectorError;
use crate::readers::http::HttpReader;

/// Retrieves the raw feed document for a site.
/// The feed request asks for the attack vectors to be included, they
/// carry the observation dates the reconstruction is built from.
/// A non-success response is fatal for the whole call.
pub fn retrieve(
    reader: &dyn HttpReader,
    base_url: &str,
    api_key: &str,
    site_id: &str,
) -> Result<Vec<u8>, ConnectorError> {
    trace!("Running feed::retrieve()");
    let url = format!(
        "{}/vuln/?key={}&display_attack_vectors=1&query_site={}",
        base_url.trim_end_matches('/'),
        api_key,
        site_id
    );
    debug!("Requesting the vulnerability feed for site {}", site_id);
    let response = reader.get(&url)?;
    if !response.is_valid() {
        error!(
            "Unable to retrieve the vulnerability feed, response status: {}",
            response.status
        );
        return Err(ConnectorError::RemoteIo {
            status: response.status,
            context: format!("retrieving the vulnerability feed of site {}", site_id),
        });
    }
    Ok(response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reqres::HttpResponse;
    use std::cell::RefCell;

    struct FakeReader {
        response: HttpResponse,
        requested: RefCell<Vec<String>>,
    }

    impl HttpReader for FakeReader {
        fn get(&self, url: &str) -> Result<HttpResponse, ConnectorError> {
            self.requested.borrow_mut().push(url.to_string());
            Ok(self.response.clone())
        }
    }

    #[test]
    fn the_feed_request_carries_the_site_and_the_vectors_flag() {
        let reader = FakeReader {
            response: HttpResponse::new(200, b"<vulnerabilities/>".to_vec()),
            requested: RefCell::new(Vec::new()),
        };
        let body = retrieve(&reader, "https://api.example.com/", "key123", "42").unwrap();
        assert_eq!(body, b"<vulnerabilities/>");

        let requested = reader.requested.borrow();
        assert_eq!(requested.len(), 1);
        assert!(requested[0].starts_with("https://api.example.com/vuln/?"));
        assert!(requested[0].contains("display_attack_vectors=1"));
        assert!(requested[0].contains("query_site=42"));
    }

    #[test]
    fn a_non_success_response_is_fatal() {
        let reader = FakeReader {
            response: HttpResponse::new(401, Vec::new()),
            requested: RefCell::new(Vec::new()),
        };
        let result = retrieve(&reader, "https://api.example.com", "bad-key", "42");
        assert!(matches!(
            result,
            Err(ConnectorError::RemoteIo { status: 401, .. })
        ));
    }
}
