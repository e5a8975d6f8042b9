//! The hierarchical container capability shared by both backends.
//!
//! A container is a tree of groups and datasets addressed by slash-delimited
//! paths (`/volumes/labels/neuron_ids`). Groups and datasets both carry
//! named attributes.

use crate::error::{CremiError, Result};
use crate::types::DataType;
use ndarray::ArrayD;
use num_traits::ToPrimitive;
use serde_json::Value;

/// Deflate level used for gzip-compressed datasets
pub const DEFAULT_GZIP_LEVEL: u8 = 4;

/// Type-erased n-dimensional dataset contents
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetData {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    Utf8(ArrayD<String>),
}

/// Run `$body` with `$array` bound to the typed array of any variant.
macro_rules! with_array {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            DatasetData::U8($array) => $body,
            DatasetData::U16($array) => $body,
            DatasetData::U32($array) => $body,
            DatasetData::U64($array) => $body,
            DatasetData::I8($array) => $body,
            DatasetData::I16($array) => $body,
            DatasetData::I32($array) => $body,
            DatasetData::I64($array) => $body,
            DatasetData::F32($array) => $body,
            DatasetData::F64($array) => $body,
            DatasetData::Utf8($array) => $body,
        }
    };
}
pub(crate) use with_array;

impl DatasetData {
    /// Element type of the contents
    pub fn data_type(&self) -> DataType {
        match self {
            DatasetData::U8(_) => DataType::U8,
            DatasetData::U16(_) => DataType::U16,
            DatasetData::U32(_) => DataType::U32,
            DatasetData::U64(_) => DataType::U64,
            DatasetData::I8(_) => DataType::I8,
            DatasetData::I16(_) => DataType::I16,
            DatasetData::I32(_) => DataType::I32,
            DatasetData::I64(_) => DataType::I64,
            DatasetData::F32(_) => DataType::F32,
            DatasetData::F64(_) => DataType::F64,
            DatasetData::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            data_type: self.data_type(),
            shape: self.shape().to_vec(),
        }
    }

    /// Flatten integer contents to `u64` in logical order
    pub fn to_u64_vec(&self) -> Result<Vec<u64>> {
        fn convert<T: ToPrimitive + Copy>(array: &ArrayD<T>, dt: DataType) -> Result<Vec<u64>> {
            array
                .iter()
                .map(|v| {
                    v.to_u64().ok_or_else(|| {
                        CremiError::InvalidFormat(format!("{} value does not fit into uint64", dt))
                    })
                })
                .collect()
        }

        let dt = self.data_type();
        match self {
            DatasetData::U8(a) => convert(a, dt),
            DatasetData::U16(a) => convert(a, dt),
            DatasetData::U32(a) => convert(a, dt),
            DatasetData::U64(a) => Ok(a.iter().copied().collect()),
            DatasetData::I8(a) => convert(a, dt),
            DatasetData::I16(a) => convert(a, dt),
            DatasetData::I32(a) => convert(a, dt),
            DatasetData::I64(a) => convert(a, dt),
            DatasetData::F32(_) | DatasetData::F64(_) | DatasetData::Utf8(_) => {
                Err(CremiError::TypeMismatch {
                    path: String::new(),
                    expected: "integer".to_string(),
                    found: dt.to_string(),
                })
            }
        }
    }

    /// Flatten numeric contents to `f64` in logical order
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        fn convert<T: ToPrimitive + Copy>(array: &ArrayD<T>) -> Vec<f64> {
            array.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect()
        }

        match self {
            DatasetData::U8(a) => Ok(convert(a)),
            DatasetData::U16(a) => Ok(convert(a)),
            DatasetData::U32(a) => Ok(convert(a)),
            DatasetData::U64(a) => Ok(convert(a)),
            DatasetData::I8(a) => Ok(convert(a)),
            DatasetData::I16(a) => Ok(convert(a)),
            DatasetData::I32(a) => Ok(convert(a)),
            DatasetData::I64(a) => Ok(convert(a)),
            DatasetData::F32(a) => Ok(convert(a)),
            DatasetData::F64(a) => Ok(a.iter().copied().collect()),
            DatasetData::Utf8(_) => Err(CremiError::TypeMismatch {
                path: String::new(),
                expected: "numeric".to_string(),
                found: DataType::Utf8.to_string(),
            }),
        }
    }
}

/// Element type and shape of a stored dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    pub data_type: DataType,
    pub shape: Vec<usize>,
}

/// Attribute value attached to a group or dataset
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret a numeric attribute as a 3-vector
    pub fn to_vec3(&self) -> Option<[f64; 3]> {
        match self {
            AttrValue::Floats(v) if v.len() == 3 => Some([v[0], v[1], v[2]]),
            AttrValue::Ints(v) if v.len() == 3 => Some([v[0] as f64, v[1] as f64, v[2] as f64]),
            _ => None,
        }
    }

    /// Convert to JSON. JSON has no representation for NaN or infinity, so
    /// non-finite floats are rejected.
    pub fn to_json(&self) -> Result<Value> {
        match self {
            AttrValue::Text(s) => Ok(Value::from(s.as_str())),
            AttrValue::Floats(v) => {
                if let Some(bad) = v.iter().find(|f| !f.is_finite()) {
                    return Err(CremiError::InvalidFormat(format!(
                        "attribute value {} cannot be stored as JSON",
                        bad
                    )));
                }
                Ok(Value::from(v.clone()))
            }
            AttrValue::Ints(v) => Ok(Value::from(v.clone())),
        }
    }

    /// Convert a JSON attribute; `None` for shapes this crate does not use
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(AttrValue::Text(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(AttrValue::Ints(vec![i])),
                None => n.as_f64().map(|f| AttrValue::Floats(vec![f])),
            },
            Value::Array(items) => {
                if items.iter().all(|v| v.is_i64()) {
                    items.iter().map(Value::as_i64).collect::<Option<_>>().map(AttrValue::Ints)
                } else {
                    items.iter().map(Value::as_f64).collect::<Option<_>>().map(AttrValue::Floats)
                }
            }
            _ => None,
        }
    }
}

impl From<[f64; 3]> for AttrValue {
    fn from(v: [f64; 3]) -> Self {
        AttrValue::Floats(v.to_vec())
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

/// Compression of a newly created dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    #[default]
    None,
    /// Deflate at [`DEFAULT_GZIP_LEVEL`]
    Gzip,
}

/// Storage options for a newly created dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetOptions {
    pub compression: CompressionMethod,
    /// Chunk shape, `None` for contiguous storage
    pub chunks: Option<Vec<usize>>,
}

impl DatasetOptions {
    pub fn new(compression: CompressionMethod) -> Self {
        Self {
            compression,
            chunks: None,
        }
    }

    pub fn with_chunks(mut self, chunks: Vec<usize>) -> Self {
        self.chunks = Some(chunks);
        self
    }
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self::new(CompressionMethod::None)
    }
}

/// Hierarchical container of groups, datasets and attributes.
///
/// Parent groups are never created implicitly: creating a node below a
/// missing group fails with [`CremiError::NotFound`].
pub trait Container {
    /// Create a group; fails with [`CremiError::AlreadyExists`] if any node
    /// exists at `path`
    fn create_group(&mut self, path: &str) -> Result<()>;

    /// Check whether a group or dataset exists at `path`
    fn contains(&self, path: &str) -> bool;

    /// Element type and shape of the dataset at `path`, `None` if absent
    fn dataset_info(&self, path: &str) -> Result<Option<DatasetInfo>>;

    /// Create a dataset holding `data`; fails if a node exists at `path`
    fn create_dataset(&mut self, path: &str, data: &DatasetData, options: &DatasetOptions)
        -> Result<()>;

    /// Replace the contents of an existing dataset of identical type and shape
    fn write_dataset(&mut self, path: &str, data: &DatasetData) -> Result<()>;

    /// Read the full contents of a dataset
    fn read_dataset(&self, path: &str) -> Result<DatasetData>;

    /// Delete a group (recursively) or dataset
    fn delete(&mut self, path: &str) -> Result<()>;

    fn set_attribute(&mut self, path: &str, name: &str, value: AttrValue) -> Result<()>;

    fn attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>>;
}
