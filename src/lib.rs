//! A connector for the WhiteHat Sentinel vulnerability feed.
//!
//! The remote service exposes one cumulative document per site, listing
//! every finding ever reported with its discovery and retest dates.
//! This crate rebuilds from it the equivalent of discrete historical
//! scans: one snapshot of the open findings per distinct observation
//! day.

pub mod application;
pub mod catalog;
pub mod errors;
pub mod feed;
pub mod models;
pub mod readers;
pub mod reconstruct;
pub mod writers;
