//! Gatherview artifact locator.
//!
//! Finds the diagnostic archives produced by a CI run by crawling the static
//! directory listings the CI storage front ends serve.
//!
//! Two front ends serve the same content with different markup:
//!
//! - the **artifact browser**, whose listing links the `artifacts/` directory
//!   directly;
//! - the **CI run page**, which only links to the artifact browser through an
//!   `Artifacts` link.
//!
//! [`ArtifactLocator::locate_artifacts_root`] handles both, and
//! [`ArtifactLocator::crawl_for_archives`] walks the tree below the artifacts
//! directory, skipping subtrees known not to contain archives.
//!
//! # Example
//!
//! ```ignore
//! use gatherview_locator::{ArtifactLocator, LocatorConfig};
//!
//! let locator = ArtifactLocator::http(LocatorConfig::default())?;
//! let location = locator.locate("https://ci.example/view/logs/job/1234").await?;
//! println!("archive at {}", location.archive_url);
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod listing;
pub mod locator;
pub mod resolve;

pub use config::LocatorConfig;
pub use error::{LocatorError, LocatorResult};
pub use listing::{HttpListingSource, Link, ListingPage, ListingSource, StaticListingSource};
pub use locator::{ArtifactLocation, ArtifactLocator};
pub use resolve::{disambiguate_filename, resolve_url};
pub use url::Url;
