//! CREMI - volumes and synapse annotations for connectomics challenges
//!
//! A Rust implementation of the CREMI file format: raw image volumes,
//! neuron and synaptic cleft label volumes, and synaptic site annotations
//! with partner links and comments, stored in a hierarchical container.
//!
//! # Features
//!
//! - Idempotent dataset writes: rewriting a dataset of the same type and
//!   shape overwrites it in place, anything else is replaced
//! - Ordered annotation sets with comments and pre/post-synaptic partners
//! - Two storage backends behind one API:
//!   - [`TreeBackend`]: a single HDF5 file
//!   - [`ChunkedBackend`]: a chunked Zarr directory store that keeps
//!     coordinates in reversed axis order (requires the `chunked` feature,
//!     enabled by default)
//!
//! # Example
//!
//! ```rust,no_run
//! use cremi::{AnnotationSet, CremiFile, OpenMode, Volume};
//! use ndarray::Array3;
//!
//! # fn example() -> cremi::Result<()> {
//! let mut file = CremiFile::open("sample_A.hdf", OpenMode::Create)?;
//!
//! let raw = Volume::new(Array3::<u8>::zeros((125, 1250, 1250)), [40.0, 4.0, 4.0]);
//! file.write_raw(&raw)?;
//!
//! let mut annotations = AnnotationSet::new();
//! annotations.add_annotation(1, "presynaptic_site", [10.0, 20.0, 30.0]);
//! annotations.add_annotation(2, "postsynaptic_site", [15.0, 20.0, 30.0]);
//! annotations.set_pre_post_partners(1, 2)?;
//! file.write_annotations(&annotations)?;
//!
//! file.close()?;
//! # Ok(())
//! # }
//! ```

pub mod annotations;
pub mod backend;
pub mod confidence;
pub mod container;
pub mod error;
pub mod file;
pub mod hdf5_file;
pub mod metadata;
pub mod types;
pub mod utils;
#[cfg(feature = "chunked")]
pub mod zarr_store;

// Re-exports
pub use annotations::{AnnotationSet, AnnotationView, POSTSYNAPTIC_SITE, PRESYNAPTIC_SITE};
pub use backend::{Backend, ChunkedBackend, ChunkedOptions, OpenMode, TreeBackend};
pub use confidence::Confidences;
pub use container::{
    AttrValue, CompressionMethod, Container, DatasetData, DatasetInfo, DatasetOptions,
};
pub use error::{CremiError, Result};
pub use file::{CremiFile, DatasetWrite};
pub use hdf5_file::Hdf5File;
pub use metadata::FormatVersion;
pub use types::{DataType, Element, Volume};
#[cfg(feature = "chunked")]
pub use zarr_store::ZarrStore;

/// Version of this crate
pub const CREMI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Format version written to the root of every container
pub const FILE_FORMAT_VERSION: &str = "0.2";
