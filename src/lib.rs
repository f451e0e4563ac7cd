//! Async Rust client library for Carbon Black Cloud device housekeeping.
//!
//! Lists devices, finds devices that stopped checking in, removes their
//! sensors (uninstall, then delete) singly or in batches, and exports
//! alerts. Every command writes a CSV report.
//!
//! # Modules
//!
//! - [`alerts`] — Alert window parsing and alert search.
//! - [`batch`] — Batch accumulator and bulk removal driver.
//! - [`client`] — Authenticated HTTP wrapper for the CBC REST API.
//! - [`config`] — Run settings with TOML overrides.
//! - [`credentials`] — API key file loading.
//! - [`devices`] — Device model, lookup, and inventory export.
//! - [`error`] — Typed error hierarchy (`CbcError`).
//! - [`inactivity`] — Inactivity cutoff and device classification.
//! - [`removal`] — Two-phase sensor removal and the single-device precheck.
//! - [`report`] — CSV report writing and reading.
//! - [`scan`] — Paginated search over `_search` endpoints.
//!
//! # Quick Start
//!
//! ```ignore
//! use cbc_devices::client::CbcClient;
//! use cbc_devices::credentials::Credentials;
//! use cbc_devices::devices::{Device, DeviceCriteria, search_path};
//! use cbc_devices::scan::scan;
//!
//! let creds = Credentials::load("apikey.txt".as_ref())?;
//! let client = CbcClient::new(creds, "https://defense-prod05.conferdeploy.net/")?;
//! let devices: Vec<Device> =
//!     scan(&client, &search_path(&client), &DeviceCriteria::registered(), 30_000).await?;
//! ```

pub mod alerts;
pub mod batch;
pub mod client;
pub mod config;
pub mod credentials;
pub mod devices;
pub mod error;
pub mod inactivity;
pub mod removal;
pub mod report;
pub mod scan;
