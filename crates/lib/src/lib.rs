//! distrogen-lib: image build manifest generation
//!
//! This crate turns a request for an operating system image into the build
//! manifest an external executor runs:
//! - `distro`: the registry of distributions, architectures and image types
//! - `blueprint`: user customizations and the rules they are checked against
//! - `disk`: partition tables and the filesystem layout planner
//! - `rpmmd`: package sets and the package resolver boundary
//! - `manifest`: pipelines, stages and the serialized executor document

pub mod blueprint;
pub mod consts;
pub mod disk;
pub mod distro;
pub mod error;
pub mod manifest;
pub mod rpmmd;
pub mod util;

pub use error::{ManifestError, Result};
