//! The errors raised by the connector.
//! A fatal remote or parse failure aborts the whole in-flight call, no
//! partial data is ever returned with an error.

use thiserror::Error;

/// Represents a fatal failure of a catalog or feed operation.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The remote provider answered with a non-success HTTP status.
    #[error("the remote provider returned HTTP status {status} while {context}")]
    RemoteIo {
        /// The HTTP status code of the response
        status: u16,
        /// What the connector was doing when the response came back
        context: String,
    },
    /// The request could not be performed at all.
    #[error("transport error: {0}")]
    Transport(String),
    /// The vulnerability feed document is structurally malformed.
    #[error("malformed vulnerability feed: {0}")]
    FeedParse(String),
    /// The site catalog document is structurally malformed.
    #[error("malformed site catalog: {0}")]
    CatalogParse(String),
    /// The requested site is not listed in the remote catalog.
    #[error("no site named \"{0}\" is known to the remote provider")]
    UnknownSite(String),
}
