// SPDX-License-Identifier: GPL-3.0-or-later

//! Client for TRaSH-Guides style custom format catalogs.
//!
//! The catalog is a directory of JSON custom format definitions per application
//! (`sonarr`, `radarr`), listed through the GitHub contents API and downloaded
//! file by file. Requests are rate limited.

pub mod client;
pub mod error;
pub mod models;
pub mod rate_limiter;

pub use client::TrashClient;
pub use error::{Result, TrashError};
pub use models::{CatalogEntry, CustomFormatDefinition, Specification};
