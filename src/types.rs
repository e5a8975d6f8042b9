//! Core data types: element types, the `Element` trait and `Volume`

use crate::container::DatasetData;
use ndarray::{Array, ArrayD, Dimension};
use std::fmt;

/// Element types a dataset can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Unsigned 32-bit integer
    U32 = 3,
    /// Unsigned 64-bit integer
    U64 = 4,
    /// Signed 8-bit integer
    I8 = 5,
    /// Signed 16-bit integer
    I16 = 6,
    /// Signed 32-bit integer
    I32 = 7,
    /// Signed 64-bit integer
    I64 = 8,
    /// 32-bit floating point
    F32 = 9,
    /// 64-bit floating point
    F64 = 10,
    /// Variable-length UTF-8 text
    Utf8 = 11,
}

impl DataType {
    /// Conventional (numpy) name of the type
    pub fn name(&self) -> &'static str {
        match self {
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
            DataType::I8 => "int8",
            DataType::I16 => "int16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
            DataType::Utf8 => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run `$body` with `$t` aliased to the Rust element type of a [`DataType`].
macro_rules! with_element_type {
    ($data_type:expr, $t:ident => $body:expr) => {
        match $data_type {
            DataType::U8 => {
                type $t = u8;
                $body
            }
            DataType::U16 => {
                type $t = u16;
                $body
            }
            DataType::U32 => {
                type $t = u32;
                $body
            }
            DataType::U64 => {
                type $t = u64;
                $body
            }
            DataType::I8 => {
                type $t = i8;
                $body
            }
            DataType::I16 => {
                type $t = i16;
                $body
            }
            DataType::I32 => {
                type $t = i32;
                $body
            }
            DataType::I64 => {
                type $t = i64;
                $body
            }
            DataType::F32 => {
                type $t = f32;
                $body
            }
            DataType::F64 => {
                type $t = f64;
                $body
            }
            DataType::Utf8 => {
                type $t = String;
                $body
            }
        }
    };
}
pub(crate) use with_element_type;

/// A scalar that can be stored in a dataset.
///
/// The element type of an array decides the declared storage type of the
/// dataset it is written to, so `Volume<u8>` is stored as `uint8` and
/// `Volume<u64>` as `uint64`.
pub trait Element: Clone + Default + fmt::Debug + PartialEq + 'static {
    /// Storage type of this element
    const DATA_TYPE: DataType;

    /// Wrap a typed array into its type-erased form
    fn into_data(array: ArrayD<Self>) -> DatasetData;

    /// Unwrap a type-erased array, `None` if the element type differs
    fn from_data(data: DatasetData) -> Option<ArrayD<Self>>;
}

macro_rules! impl_numeric_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn into_data(array: ArrayD<Self>) -> DatasetData {
                DatasetData::$variant(array)
            }

            fn from_data(data: DatasetData) -> Option<ArrayD<Self>> {
                match data {
                    DatasetData::$variant(array) => Some(array),
                    _ => None,
                }
            }
        }
    )*};
}

impl_numeric_element!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

impl Element for String {
    const DATA_TYPE: DataType = DataType::Utf8;

    fn into_data(array: ArrayD<Self>) -> DatasetData {
        DatasetData::Utf8(array)
    }

    fn from_data(data: DatasetData) -> Option<ArrayD<Self>> {
        match data {
            DatasetData::Utf8(array) => Some(array),
            _ => None,
        }
    }
}

/// A volume: an n-dimensional array with its spatial metadata.
///
/// `resolution` and `offset` are given in world units, in the axis order of
/// the array (z, y, x for CREMI volumes).
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    /// Voxel data
    pub data: ArrayD<T>,
    /// Size of one voxel along each axis
    pub resolution: [f64; 3],
    /// Position of the first voxel
    pub offset: [f64; 3],
    /// Free-text comment
    pub comment: Option<String>,
}

impl<T> Volume<T> {
    /// Create a volume with zero offset and no comment
    pub fn new<D: Dimension>(data: Array<T, D>, resolution: [f64; 3]) -> Self {
        Self {
            data: data.into_dyn(),
            resolution,
            offset: [0.0; 3],
            comment: None,
        }
    }

    /// Set the offset
    pub fn with_offset(mut self, offset: [f64; 3]) -> Self {
        self.offset = offset;
        self
    }

    /// Set the comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Shape of the voxel data
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}
