//! HDF5 container, the storage engine behind [`TreeBackend`].
//!
//! Groups, datasets and attributes map one to one onto HDF5 objects, so
//! files written here open in any HDF5 tool and CREMI files written
//! elsewhere open here. Text is stored as variable-length UTF-8 strings.
//!
//! [`TreeBackend`]: crate::backend::TreeBackend

use crate::backend::OpenMode;
use crate::container::{
    with_array, AttrValue, CompressionMethod, Container, DatasetData, DatasetInfo,
    DatasetOptions, DEFAULT_GZIP_LEVEL,
};
use crate::error::{CremiError, Result};
use crate::types::{with_element_type, DataType, Element};
use crate::utils::{
    group_prefixes, negotiate_chunks, normalize_path, split_parent, DEFAULT_CHUNK_SIZE,
};
use hdf5::types::{FloatSize, H5Type, IntSize, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, Dataset, File, Group, Location};
use ndarray::{ArrayD, IxDyn};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Element with an HDF5 in-file representation
trait Stored: Element {
    type H5: H5Type;

    fn to_h5(&self) -> Result<Self::H5>;

    fn from_h5(value: Self::H5) -> Self;
}

macro_rules! impl_stored_as_self {
    ($($ty:ty),* $(,)?) => {$(
        impl Stored for $ty {
            type H5 = $ty;

            fn to_h5(&self) -> Result<$ty> {
                Ok(*self)
            }

            fn from_h5(value: $ty) -> Self {
                value
            }
        }
    )*};
}

impl_stored_as_self!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Stored for String {
    type H5 = VarLenUnicode;

    fn to_h5(&self) -> Result<VarLenUnicode> {
        to_var_len_unicode(self)
    }

    fn from_h5(value: VarLenUnicode) -> Self {
        value.as_str().to_string()
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| CremiError::InvalidFormat(format!("invalid utf-8 string: {e}")))
}

/// Element type of an HDF5 type, `None` for types CREMI files never hold
fn data_type_of(descriptor: &TypeDescriptor) -> Option<DataType> {
    let data_type = match descriptor {
        TypeDescriptor::Unsigned(IntSize::U1) => DataType::U8,
        TypeDescriptor::Unsigned(IntSize::U2) => DataType::U16,
        TypeDescriptor::Unsigned(IntSize::U4) => DataType::U32,
        TypeDescriptor::Unsigned(IntSize::U8) => DataType::U64,
        TypeDescriptor::Integer(IntSize::U1) => DataType::I8,
        TypeDescriptor::Integer(IntSize::U2) => DataType::I16,
        TypeDescriptor::Integer(IntSize::U4) => DataType::I32,
        TypeDescriptor::Integer(IntSize::U8) => DataType::I64,
        TypeDescriptor::Float(FloatSize::U4) => DataType::F32,
        TypeDescriptor::Float(FloatSize::U8) => DataType::F64,
        TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => DataType::Utf8,
        _ => return None,
    };
    Some(data_type)
}

fn stored_type(path: &str, dataset: &Dataset) -> Result<DataType> {
    let descriptor = dataset.dtype()?.to_descriptor()?;
    data_type_of(&descriptor).ok_or_else(|| CremiError::TypeMismatch {
        path: path.to_string(),
        expected: "numeric or string element type".to_string(),
        found: format!("{:?}", descriptor),
    })
}

fn is_numeric(descriptor: &TypeDescriptor) -> bool {
    matches!(
        descriptor,
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Float(_)
    )
}

enum Node {
    Group(Group),
    Dataset(Dataset),
}

impl Node {
    fn location(&self) -> &Location {
        match self {
            Node::Group(group) => group,
            Node::Dataset(dataset) => dataset,
        }
    }
}

/// An opened HDF5 file
#[derive(Debug)]
pub struct Hdf5File {
    file: File,
    path: PathBuf,
    read_only: bool,
}

impl Hdf5File {
    /// Open `path` with the semantics of `mode`
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let exists = path.exists();
        let file = match mode {
            OpenMode::Read | OpenMode::ReadWrite if !exists => {
                return Err(CremiError::NotFound(path.display().to_string()))
            }
            OpenMode::Read => File::open(path)?,
            OpenMode::ReadWrite => File::open_rw(path)?,
            OpenMode::Create => File::create(path)?,
            OpenMode::CreateNew if exists => {
                return Err(CremiError::AlreadyExists(path.display().to_string()))
            }
            OpenMode::CreateNew => File::create_excl(path)?,
            OpenMode::Append => File::append(path)?,
        };

        tracing::debug!(path = %path.display(), ?mode, "opened HDF5 file");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            read_only: mode == OpenMode::Read,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Flush buffered changes to disk
    pub fn flush(&self) -> Result<()> {
        if !self.read_only {
            self.file.flush()?;
        }
        Ok(())
    }

    fn ensure_writable(&self, path: &str) -> Result<()> {
        if self.read_only {
            Err(CremiError::ReadOnly(path.to_string()))
        } else {
            Ok(())
        }
    }

    fn node(&self, path: &str) -> Option<Node> {
        let path = normalize_path(path);
        // a missing link anywhere along the path means no node
        if !group_prefixes(&path)
            .iter()
            .all(|prefix| self.file.link_exists(prefix))
        {
            return None;
        }
        match self.file.dataset(&path) {
            Ok(dataset) => Some(Node::Dataset(dataset)),
            Err(_) => self.file.group(&path).ok().map(Node::Group),
        }
    }

    fn dataset(&self, path: &str) -> Result<Dataset> {
        match self.node(path) {
            Some(Node::Dataset(dataset)) => Ok(dataset),
            Some(Node::Group(_)) => Err(CremiError::NotADataset(path.to_string())),
            None => Err(CremiError::NotFound(path.to_string())),
        }
    }

    /// Parent group of `path`, and the leaf name
    fn parent_group(&self, path: &str) -> Result<(Group, String)> {
        let (parent, name) = split_parent(path);
        if name.is_empty() {
            return Err(CremiError::AlreadyExists("/".to_string()));
        }
        match self.node(&parent) {
            Some(Node::Group(group)) => Ok((group, name)),
            Some(Node::Dataset(_)) => Err(CremiError::NotAGroup(parent)),
            None => Err(CremiError::NotFound(parent)),
        }
    }
}

fn create_typed<T: Stored>(
    group: &Group,
    name: &str,
    array: &ArrayD<T>,
    options: &DatasetOptions,
) -> Result<()> {
    let shape = array.shape().to_vec();
    let values = array.iter().map(Stored::to_h5).collect::<Result<Vec<_>>>()?;

    // deflate needs a chunked layout; skip it for empty datasets
    let compress = options.compression == CompressionMethod::Gzip
        && !shape.is_empty()
        && !shape.contains(&0);
    let chunks = match &options.chunks {
        Some(chunks) => Some(chunks.clone()),
        None if compress => Some(negotiate_chunks(
            &shape,
            &vec![DEFAULT_CHUNK_SIZE; shape.len()],
        )),
        None => None,
    };

    let mut builder = group.new_dataset::<T::H5>().shape(shape);
    if let Some(chunks) = chunks {
        builder = builder.chunk(chunks);
    }
    if compress {
        builder = builder.deflate(DEFAULT_GZIP_LEVEL);
    }
    let dataset = builder.create(name)?;

    if !values.is_empty() {
        dataset.write_raw(values.as_slice())?;
    }
    Ok(())
}

fn write_typed<T: Stored>(dataset: &Dataset, array: &ArrayD<T>) -> Result<()> {
    let values = array.iter().map(Stored::to_h5).collect::<Result<Vec<_>>>()?;
    if !values.is_empty() {
        dataset.write_raw(values.as_slice())?;
    }
    Ok(())
}

fn read_typed<T: Stored>(dataset: &Dataset, shape: &[usize]) -> Result<DatasetData> {
    let values: Vec<T> = dataset
        .read_raw::<T::H5>()?
        .into_iter()
        .map(T::from_h5)
        .collect();
    Ok(T::into_data(ArrayD::from_shape_vec(IxDyn(shape), values)?))
}

fn create_attribute(location: &Location, name: &str, value: &AttrValue) -> Result<()> {
    match value {
        AttrValue::Text(text) => location
            .new_attr::<VarLenUnicode>()
            .create(name)?
            .write_scalar(&to_var_len_unicode(text)?)?,
        AttrValue::Floats(values) => location
            .new_attr::<f64>()
            .shape((values.len(),))
            .create(name)?
            .write_raw(values.as_slice())?,
        AttrValue::Ints(values) => location
            .new_attr::<i64>()
            .shape((values.len(),))
            .create(name)?
            .write_raw(values.as_slice())?,
    }
    Ok(())
}

/// Rewrite an existing attribute. HDF5 attributes keep the type and shape
/// they were created with, so the new value must fit both.
fn overwrite_attribute(attr: &Attribute, path: &str, name: &str, value: &AttrValue) -> Result<()> {
    let descriptor = attr.dtype()?.to_descriptor()?;
    let shape = attr.shape();
    let fits = match value {
        AttrValue::Text(_) => {
            matches!(descriptor, TypeDescriptor::VarLenUnicode) && shape.is_empty()
        }
        AttrValue::Floats(values) => is_numeric(&descriptor) && shape == [values.len()],
        AttrValue::Ints(values) => is_numeric(&descriptor) && shape == [values.len()],
    };
    if !fits {
        return Err(CremiError::TypeMismatch {
            path: format!("{}@{}", path, name),
            expected: format!("{:?} {:?}", descriptor, shape),
            found: format!("{:?}", value),
        });
    }

    match value {
        AttrValue::Text(text) => attr.write_scalar(&to_var_len_unicode(text)?)?,
        AttrValue::Floats(values) => attr.write_raw(values.as_slice())?,
        AttrValue::Ints(values) => attr.write_raw(values.as_slice())?,
    }
    Ok(())
}

impl Container for Hdf5File {
    fn create_group(&mut self, path: &str) -> Result<()> {
        self.ensure_writable(path)?;
        let (parent, name) = self.parent_group(path)?;
        if parent.link_exists(&name) {
            return Err(CremiError::AlreadyExists(path.to_string()));
        }
        parent.create_group(&name)?;
        Ok(())
    }

    fn contains(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    fn dataset_info(&self, path: &str) -> Result<Option<DatasetInfo>> {
        match self.node(path) {
            None => Ok(None),
            Some(Node::Group(_)) => Err(CremiError::NotADataset(path.to_string())),
            Some(Node::Dataset(dataset)) => Ok(Some(DatasetInfo {
                data_type: stored_type(path, &dataset)?,
                shape: dataset.shape(),
            })),
        }
    }

    fn create_dataset(
        &mut self,
        path: &str,
        data: &DatasetData,
        options: &DatasetOptions,
    ) -> Result<()> {
        self.ensure_writable(path)?;
        let (parent, name) = self.parent_group(path)?;
        if parent.link_exists(&name) {
            return Err(CremiError::AlreadyExists(path.to_string()));
        }
        with_array!(data, array => create_typed(&parent, &name, array, options))
    }

    fn write_dataset(&mut self, path: &str, data: &DatasetData) -> Result<()> {
        self.ensure_writable(path)?;
        let dataset = self.dataset(path)?;
        let info = DatasetInfo {
            data_type: stored_type(path, &dataset)?,
            shape: dataset.shape(),
        };
        if info != data.info() {
            return Err(CremiError::TypeMismatch {
                path: path.to_string(),
                expected: format!("{} {:?}", info.data_type, info.shape),
                found: format!("{} {:?}", data.data_type(), data.shape()),
            });
        }
        with_array!(data, array => write_typed(&dataset, array))
    }

    fn read_dataset(&self, path: &str) -> Result<DatasetData> {
        let dataset = self.dataset(path)?;
        let shape = dataset.shape();
        let descriptor = dataset.dtype()?.to_descriptor()?;
        if matches!(descriptor, TypeDescriptor::VarLenAscii) {
            let values: Vec<String> = dataset
                .read_raw::<VarLenAscii>()?
                .iter()
                .map(|v| v.as_str().to_string())
                .collect();
            return Ok(DatasetData::Utf8(ArrayD::from_shape_vec(IxDyn(&shape), values)?));
        }
        let data_type = stored_type(path, &dataset)?;
        with_element_type!(data_type, T => read_typed::<T>(&dataset, &shape))
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        self.ensure_writable(path)?;
        let (parent, name) = self.parent_group(path)?;
        if !parent.link_exists(&name) {
            return Err(CremiError::NotFound(path.to_string()));
        }
        parent.unlink(&name)?;
        Ok(())
    }

    fn set_attribute(&mut self, path: &str, name: &str, value: AttrValue) -> Result<()> {
        self.ensure_writable(path)?;
        let node = self
            .node(path)
            .ok_or_else(|| CremiError::NotFound(path.to_string()))?;
        let location = node.location();
        match location.attr(name) {
            Ok(existing) => overwrite_attribute(&existing, path, name, &value),
            Err(_) => create_attribute(location, name, &value),
        }
    }

    fn attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        let node = self
            .node(path)
            .ok_or_else(|| CremiError::NotFound(path.to_string()))?;
        let attr = match node.location().attr(name) {
            Ok(attr) => attr,
            Err(_) => return Ok(None),
        };

        let value = match attr.dtype()?.to_descriptor()? {
            TypeDescriptor::VarLenUnicode => {
                AttrValue::Text(attr.read_scalar::<VarLenUnicode>()?.as_str().to_string())
            }
            TypeDescriptor::VarLenAscii => {
                AttrValue::Text(attr.read_scalar::<VarLenAscii>()?.as_str().to_string())
            }
            TypeDescriptor::Float(_) => AttrValue::Floats(attr.read_raw::<f64>()?),
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
                AttrValue::Ints(attr.read_raw::<i64>()?)
            }
            other => {
                return Err(CremiError::TypeMismatch {
                    path: format!("{}@{}", path, name),
                    expected: "text or numeric attribute".to_string(),
                    found: format!("{:?}", other),
                })
            }
        };
        Ok(Some(value))
    }
}
