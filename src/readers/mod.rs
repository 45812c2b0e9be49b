//! This module declares all readers.
//! A reader is used to fetch data over the network. The connector only
//! needs HTTP. Its objective is to make fetching data easier, to focus
//! on the reconstruction of the scans.

pub mod http;
