//! Backends: the per-engine half of a CREMI file.
//!
//! A [`Backend`] owns an opened container and decides how coordinates are
//! ordered on disk, how new datasets are chunked and what closing means.
//! Everything else lives once in [`CremiFile`](crate::CremiFile).

use crate::container::{CompressionMethod, Container, DatasetOptions};
use crate::error::{CremiError, Result};
use crate::hdf5_file::Hdf5File;
use crate::metadata::{FormatVersion, FORMAT_VERSION_ATTR};
use crate::utils::DEFAULT_CHUNK_SIZE;
#[cfg(feature = "chunked")]
use crate::utils::negotiate_chunks;
#[cfg(feature = "chunked")]
use crate::zarr_store::ZarrStore;
use std::path::Path;
use std::str::FromStr;

/// Engine-specific behaviour of a CREMI file
pub trait Backend {
    type Container: Container;

    fn container(&self) -> &Self::Container;

    fn container_mut(&mut self) -> &mut Self::Container;

    /// Transform a coordinate triple between caller and stored axis order.
    /// Applying it twice is the identity.
    fn spatial(&self, coords: [f64; 3]) -> [f64; 3];

    /// Storage options for a dataset of `shape` about to be created
    fn dataset_options(&self, _shape: &[usize], compression: CompressionMethod) -> DatasetOptions {
        DatasetOptions::new(compression)
    }

    /// Release the container, persisting pending changes
    fn close(&mut self) -> Result<()>;
}

/// How an HDF5 file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read only, file must exist (`r`)
    Read,
    /// Read/write, file must exist (`r+`)
    ReadWrite,
    /// Create, truncating any existing file (`w`)
    Create,
    /// Create, fail if the file exists (`w-` or `x`)
    CreateNew,
    /// Read/write if the file exists, create otherwise (`a`)
    #[default]
    Append,
}

impl OpenMode {
    /// Modes that stamp the format version on open
    pub fn writes_format_version(&self) -> bool {
        matches!(self, OpenMode::Create | OpenMode::Append)
    }
}

impl FromStr for OpenMode {
    type Err = CremiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(OpenMode::Read),
            "r+" => Ok(OpenMode::ReadWrite),
            "w" => Ok(OpenMode::Create),
            "w-" | "x" => Ok(OpenMode::CreateNew),
            "a" => Ok(OpenMode::Append),
            _ => Err(CremiError::InvalidFormat(format!("unknown open mode '{}'", s))),
        }
    }
}

/// Backend over a single HDF5 file.
///
/// Coordinates are stored as given.
#[derive(Debug)]
pub struct TreeBackend {
    file: Hdf5File,
}

impl TreeBackend {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let mut file = Hdf5File::open(path, mode)?;

        if mode.writes_format_version() {
            file.set_attribute(
                "/",
                FORMAT_VERSION_ATTR,
                FormatVersion::CURRENT.to_string().into(),
            )?;
        } else {
            let version = file
                .attribute("/", FORMAT_VERSION_ATTR)?
                .and_then(|v| v.as_text().and_then(FormatVersion::parse));
            match version {
                Some(v) if !v.is_compatible(&FormatVersion::CURRENT) => {
                    tracing::warn!(
                        path = %path.display(),
                        version = %v,
                        "file format version may not be supported"
                    );
                }
                None => tracing::debug!(path = %path.display(), "file has no format version"),
                _ => {}
            }
        }

        Ok(Self { file })
    }
}

impl Backend for TreeBackend {
    type Container = Hdf5File;

    fn container(&self) -> &Hdf5File {
        &self.file
    }

    fn container_mut(&mut self) -> &mut Hdf5File {
        &mut self.file
    }

    fn spatial(&self, coords: [f64; 3]) -> [f64; 3] {
        coords
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()
    }
}

/// Configuration of a chunked backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedOptions {
    /// Requested chunk shape, clamped per write to the data shape
    pub chunks: Vec<usize>,
}

impl ChunkedOptions {
    pub fn with_chunks(mut self, chunks: impl Into<Vec<usize>>) -> Self {
        self.chunks = chunks.into();
        self
    }
}

impl Default for ChunkedOptions {
    fn default() -> Self {
        Self {
            chunks: vec![DEFAULT_CHUNK_SIZE; 3],
        }
    }
}

/// Backend over a chunked array store.
///
/// Coordinates are stored in reversed axis order, every dataset is chunked
/// and writes persist immediately, so closing does nothing.
#[cfg(feature = "chunked")]
#[derive(Debug)]
pub struct ChunkedBackend {
    store: ZarrStore,
    options: ChunkedOptions,
}

/// Stand-in for the chunked backend when the `chunked` feature is off; it
/// cannot be opened.
#[cfg(not(feature = "chunked"))]
#[derive(Debug)]
pub struct ChunkedBackend {
    _unavailable: (),
}

#[cfg(feature = "chunked")]
impl ChunkedBackend {
    pub fn open(path: impl AsRef<Path>, options: ChunkedOptions) -> Result<Self> {
        let mut store = ZarrStore::open(path)?;
        store.set_attribute(
            "/",
            FORMAT_VERSION_ATTR,
            FormatVersion::CURRENT.to_string().into(),
        )?;
        Ok(Self { store, options })
    }
}

#[cfg(not(feature = "chunked"))]
impl ChunkedBackend {
    pub fn open(_path: impl AsRef<Path>, _options: ChunkedOptions) -> Result<Self> {
        Err(CremiError::DependencyMissing(
            "chunked array storage not supported; build with the `chunked` feature".to_string(),
        ))
    }
}

#[cfg(feature = "chunked")]
impl Backend for ChunkedBackend {
    type Container = ZarrStore;

    fn container(&self) -> &ZarrStore {
        &self.store
    }

    fn container_mut(&mut self) -> &mut ZarrStore {
        &mut self.store
    }

    fn spatial(&self, coords: [f64; 3]) -> [f64; 3] {
        let [a, b, c] = coords;
        [c, b, a]
    }

    fn dataset_options(&self, shape: &[usize], compression: CompressionMethod) -> DatasetOptions {
        DatasetOptions::new(compression).with_chunks(negotiate_chunks(shape, &self.options.chunks))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
