//! Chunked directory store, the storage engine behind [`ChunkedBackend`].
//!
//! Every group and dataset is a directory of a Zarr filesystem store,
//! described by its own metadata document. Dataset contents are split into
//! chunk files and attributes are kept as JSON in the metadata.
//!
//! [`ChunkedBackend`]: crate::backend::ChunkedBackend

use crate::container::{
    with_array, AttrValue, CompressionMethod, Container, DatasetData, DatasetInfo,
    DatasetOptions, DEFAULT_GZIP_LEVEL,
};
use crate::error::{CremiError, Result};
use crate::types::{with_element_type, DataType, Element};
use crate::utils::{normalize_path, path_segments, split_parent};
use ndarray::{ArrayD, IxDyn};
use serde_json::{Map, Value};
use std::fmt;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zarrs::array::chunk_grid::ChunkGrid;
use zarrs::array::codec::GzipCodec;
use zarrs::array::{Array, ArrayBuilder, FillValue};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::{Group, GroupBuilder};
use zarrs::storage::{ReadableWritableListableStorage, ReadableWritableListableStorageTraits};

/// Metadata document of every node
const METADATA_FILE: &str = "zarr.json";

type StoreArray = Array<dyn ReadableWritableListableStorageTraits>;

fn store_error(e: impl fmt::Display) -> CremiError {
    CremiError::Store(e.to_string())
}

/// Element with a Zarr data type
trait Stored: Element + zarrs::array::Element + zarrs::array::ElementOwned {
    fn zarr_type() -> zarrs::array::DataType;

    fn fill_value() -> FillValue;
}

macro_rules! impl_stored {
    ($($ty:ty => $zarr:ident),* $(,)?) => {$(
        impl Stored for $ty {
            fn zarr_type() -> zarrs::array::DataType {
                zarrs::array::DataType::$zarr
            }

            fn fill_value() -> FillValue {
                FillValue::from(<$ty>::default())
            }
        }
    )*};
}

impl_stored!(
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
);

impl Stored for String {
    fn zarr_type() -> zarrs::array::DataType {
        zarrs::array::DataType::String
    }

    fn fill_value() -> FillValue {
        FillValue::from("")
    }
}

/// Element type of a stored array
fn element_type(path: &str, zarr_type: &zarrs::array::DataType) -> Result<DataType> {
    use zarrs::array::DataType as Z;

    let known = [
        (Z::UInt8, DataType::U8),
        (Z::UInt16, DataType::U16),
        (Z::UInt32, DataType::U32),
        (Z::UInt64, DataType::U64),
        (Z::Int8, DataType::I8),
        (Z::Int16, DataType::I16),
        (Z::Int32, DataType::I32),
        (Z::Int64, DataType::I64),
        (Z::Float32, DataType::F32),
        (Z::Float64, DataType::F64),
        (Z::String, DataType::Utf8),
    ];
    known
        .into_iter()
        .find(|(z, _)| z == zarr_type)
        .map(|(_, data_type)| data_type)
        .ok_or_else(|| CremiError::TypeMismatch {
            path: path.to_string(),
            expected: "numeric or string element type".to_string(),
            found: format!("{:?}", zarr_type),
        })
}

fn chunk_grid(chunks: &[usize]) -> ChunkGrid {
    let edges: Vec<NonZeroU64> = chunks
        .iter()
        .map(|&c| NonZeroU64::new(c as u64).unwrap_or(NonZeroU64::MIN))
        .collect();
    ChunkGrid::from(edges)
}

fn store_elements<T: Stored>(zarr_array: &StoreArray, array: &ArrayD<T>) -> Result<()> {
    if array.is_empty() {
        return Ok(());
    }
    let values: Vec<T> = array.iter().cloned().collect();
    zarr_array
        .store_array_subset_elements::<T>(&zarr_array.subset_all(), &values)
        .map_err(store_error)
}

fn retrieve_elements<T: Stored>(zarr_array: &StoreArray) -> Result<DatasetData> {
    let shape: Vec<usize> = zarr_array.shape().iter().map(|&d| d as usize).collect();
    let values: Vec<T> = if shape.contains(&0) {
        Vec::new()
    } else {
        zarr_array
            .retrieve_array_subset_elements::<T>(&zarr_array.subset_all())
            .map_err(store_error)?
    };
    Ok(T::into_data(ArrayD::from_shape_vec(IxDyn(&shape), values)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Group,
    Dataset,
}

/// A chunked store rooted at a directory
pub struct ZarrStore {
    root: PathBuf,
    store: ReadableWritableListableStorage,
}

impl fmt::Debug for ZarrStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZarrStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ZarrStore {
    /// Open the store at `path`, creating the directory and root group if
    /// needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let store: ReadableWritableListableStorage =
            Arc::new(FilesystemStore::new(&root).map_err(store_error)?);
        let this = Self { root, store };

        match this.kind("/") {
            Some(NodeKind::Group) => {}
            Some(NodeKind::Dataset) => {
                return Err(CremiError::InvalidFormat(format!(
                    "root of {} is a dataset",
                    this.root.display()
                )))
            }
            None => {
                GroupBuilder::new()
                    .build(this.store.clone(), "/")
                    .map_err(store_error)?
                    .store_metadata()
                    .map_err(store_error)?;
                tracing::debug!(root = %this.root.display(), "created chunked store");
            }
        }
        Ok(this)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the node at a normalized `path`
    fn directory(&self, path: &str) -> PathBuf {
        path_segments(path)
            .into_iter()
            .fold(self.root.clone(), |dir, segment| dir.join(segment))
    }

    fn kind(&self, path: &str) -> Option<NodeKind> {
        let path = normalize_path(path);
        if !self.directory(&path).join(METADATA_FILE).is_file() {
            return None;
        }
        // the metadata document names the node type, so an array that fails
        // to open is a group
        match Array::open(self.store.clone(), &path) {
            Ok(_) => Some(NodeKind::Dataset),
            Err(_) => Some(NodeKind::Group),
        }
    }

    fn array(&self, path: &str) -> Result<StoreArray> {
        let path = normalize_path(path);
        match self.kind(&path) {
            Some(NodeKind::Dataset) => {
                Array::open(self.store.clone(), &path).map_err(store_error)
            }
            Some(NodeKind::Group) => Err(CremiError::NotADataset(path)),
            None => Err(CremiError::NotFound(path)),
        }
    }

    /// Check that the parent of `path` is a group and nothing exists at `path`
    fn check_new_node(&self, path: &str) -> Result<()> {
        let (parent, name) = split_parent(path);
        if name.is_empty() {
            return Err(CremiError::AlreadyExists("/".to_string()));
        }
        match self.kind(&parent) {
            Some(NodeKind::Group) => {}
            Some(NodeKind::Dataset) => return Err(CremiError::NotAGroup(parent)),
            None => return Err(CremiError::NotFound(parent)),
        }
        if self.kind(path).is_some() {
            return Err(CremiError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    fn create_typed<T: Stored>(
        &self,
        path: &str,
        array: &ArrayD<T>,
        options: &DatasetOptions,
    ) -> Result<()> {
        let shape: Vec<u64> = array.shape().iter().map(|&d| d as u64).collect();
        let chunks = options
            .chunks
            .clone()
            .unwrap_or_else(|| array.shape().to_vec());

        let mut builder =
            ArrayBuilder::new(shape, T::zarr_type(), chunk_grid(&chunks), T::fill_value());
        if options.compression == CompressionMethod::Gzip {
            let gzip = GzipCodec::new(u32::from(DEFAULT_GZIP_LEVEL)).map_err(store_error)?;
            builder.bytes_to_bytes_codecs(vec![Arc::new(gzip)]);
        }
        let zarr_array = builder
            .build(self.store.clone(), path)
            .map_err(store_error)?;
        zarr_array.store_metadata().map_err(store_error)?;
        store_elements(&zarr_array, array)
    }

    fn attributes(&self, path: &str) -> Result<Map<String, Value>> {
        let path = normalize_path(path);
        match self.kind(&path) {
            Some(NodeKind::Dataset) => Ok(Array::open(self.store.clone(), &path)
                .map_err(store_error)?
                .attributes()
                .clone()),
            Some(NodeKind::Group) => Ok(Group::open(self.store.clone(), &path)
                .map_err(store_error)?
                .attributes()
                .clone()),
            None => Err(CremiError::NotFound(path)),
        }
    }
}

impl Container for ZarrStore {
    fn create_group(&mut self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        self.check_new_node(&path)?;
        GroupBuilder::new()
            .build(self.store.clone(), &path)
            .map_err(store_error)?
            .store_metadata()
            .map_err(store_error)
    }

    fn contains(&self, path: &str) -> bool {
        self.kind(path).is_some()
    }

    fn dataset_info(&self, path: &str) -> Result<Option<DatasetInfo>> {
        let path = normalize_path(path);
        match self.kind(&path) {
            None => Ok(None),
            Some(NodeKind::Group) => Err(CremiError::NotADataset(path)),
            Some(NodeKind::Dataset) => {
                let array = self.array(&path)?;
                Ok(Some(DatasetInfo {
                    data_type: element_type(&path, array.data_type())?,
                    shape: array.shape().iter().map(|&d| d as usize).collect(),
                }))
            }
        }
    }

    fn create_dataset(
        &mut self,
        path: &str,
        data: &DatasetData,
        options: &DatasetOptions,
    ) -> Result<()> {
        let path = normalize_path(path);
        self.check_new_node(&path)?;
        with_array!(data, array => self.create_typed(&path, array, options))
    }

    fn write_dataset(&mut self, path: &str, data: &DatasetData) -> Result<()> {
        let info = self
            .dataset_info(path)?
            .ok_or_else(|| CremiError::NotFound(path.to_string()))?;
        if info != data.info() {
            return Err(CremiError::TypeMismatch {
                path: path.to_string(),
                expected: format!("{} {:?}", info.data_type, info.shape),
                found: format!("{} {:?}", data.data_type(), data.shape()),
            });
        }
        let zarr_array = self.array(path)?;
        with_array!(data, array => store_elements(&zarr_array, array))
    }

    fn read_dataset(&self, path: &str) -> Result<DatasetData> {
        let zarr_array = self.array(path)?;
        let data_type = element_type(path, zarr_array.data_type())?;
        with_element_type!(data_type, T => retrieve_elements::<T>(&zarr_array))
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Err(CremiError::InvalidFormat(
                "cannot delete the root group".to_string(),
            ));
        }
        if self.kind(&path).is_none() {
            return Err(CremiError::NotFound(path));
        }
        std::fs::remove_dir_all(self.directory(&path))?;
        Ok(())
    }

    fn set_attribute(&mut self, path: &str, name: &str, value: AttrValue) -> Result<()> {
        let path = normalize_path(path);
        let value = value.to_json()?;
        match self.kind(&path) {
            Some(NodeKind::Dataset) => {
                let mut array = Array::open(self.store.clone(), &path).map_err(store_error)?;
                array.attributes_mut().insert(name.to_string(), value);
                array.store_metadata().map_err(store_error)
            }
            Some(NodeKind::Group) => {
                let mut group = Group::open(self.store.clone(), &path).map_err(store_error)?;
                group.attributes_mut().insert(name.to_string(), value);
                group.store_metadata().map_err(store_error)
            }
            None => Err(CremiError::NotFound(path)),
        }
    }

    fn attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        let attributes = self.attributes(path)?;
        match attributes.get(name) {
            None => Ok(None),
            Some(value) => AttrValue::from_json(value)
                .map(Some)
                .ok_or_else(|| CremiError::TypeMismatch {
                    path: format!("{}@{}", normalize_path(path), name),
                    expected: "text or numeric attribute".to_string(),
                    found: value.to_string(),
                }),
        }
    }
}
