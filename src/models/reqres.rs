//! In this module are declared the types exchanged with the HTTP
//! transport. The transport only performs a GET and exposes the
//! validity, status and bytes of the response.

/// Represents the response returned by an HTTP reader
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// The HTTP status code of the response
    pub status: u16,
    /// The raw bytes of the response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a new HttpResponse
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        HttpResponse { status, body }
    }

    /// Whether the response is a success.
    /// Anything outside 2xx is considered invalid.
    pub fn is_valid(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
