//! Version parsing and ordering
//!
//! Release artifacts are named with a semantic version that may carry a
//! prerelease tag and a numeric build identifier in its build metadata
//! (`24.1.5-beta+100.tar.gz`). Plain semver has no notion of that build
//! identifier, so this module adds it on top of the `semver` crate.
//!
//! # Modules
//!
//! - [`parser`]: extraction of a [`Version`] from any artifact identifier
//! - [`semver`]: the total order over versions
//! - [`series`]: `MAJOR[.MINOR]` hints scoping "latest" lookups
//! - [`error`]: parse failures

pub mod error;
pub mod parser;
pub mod semver;
pub mod series;

pub use error::ParseError;
pub use parser::{Version, is_archive_name, parse, validate};
pub use semver::compare;
pub use series::Series;
