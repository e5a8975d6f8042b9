//! CREMI files - main API for reading/writing volumes and annotations

use crate::annotations::AnnotationSet;
#[cfg(feature = "chunked")]
use crate::backend::{ChunkedBackend, ChunkedOptions};
use crate::backend::{Backend, OpenMode, TreeBackend};
use crate::confidence::Confidences;
use crate::container::{AttrValue, CompressionMethod, Container, DatasetData};
use crate::error::{CremiError, Result};
use crate::metadata::*;
use crate::types::{Element, Volume};
use crate::utils::{group_prefixes, split_parent};
use ndarray::{Array1, Array2};
use std::path::Path;

const RESOLUTION_ATTR: &str = "resolution";
const OFFSET_ATTR: &str = "offset";
const COMMENT_ATTR: &str = "comment";

/// What a dataset write did to the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetWrite {
    /// Nothing existed at the path
    Created,
    /// A dataset of the same type and shape had its contents replaced
    Overwritten,
    /// An incompatible dataset was deleted and created anew
    Replaced,
}

/// A CREMI file: volumes and synapse annotations on top of a backend
pub struct CremiFile<B: Backend> {
    backend: B,
}

impl CremiFile<TreeBackend> {
    /// Open an HDF5 file
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Ok(Self::from_backend(TreeBackend::open(path, mode)?))
    }
}

#[cfg(feature = "chunked")]
impl CremiFile<ChunkedBackend> {
    /// Open (or create) a chunked container directory
    pub fn open_chunked(path: impl AsRef<Path>, options: ChunkedOptions) -> Result<Self> {
        Ok(Self::from_backend(ChunkedBackend::open(path, options)?))
    }
}

impl<B: Backend> CremiFile<B> {
    pub fn from_backend(backend: B) -> Self {
        Self { backend }
    }

    /// The underlying container
    pub fn container(&self) -> &B::Container {
        self.backend.container()
    }

    pub fn container_mut(&mut self) -> &mut B::Container {
        self.backend.container_mut()
    }

    /// Close the file, persisting pending changes
    pub fn close(mut self) -> Result<()> {
        self.backend.close()
    }

    /// Create `group` and all groups above it; existing groups are fine
    fn create_group(&mut self, group: &str) -> Result<()> {
        for prefix in group_prefixes(group) {
            match self.backend.container_mut().create_group(&prefix) {
                Ok(()) | Err(CremiError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write a dataset, reusing or replacing whatever is at `path`.
    ///
    /// Parent groups are created as needed. An existing dataset of the same
    /// element type and shape is overwritten in place; any other dataset is
    /// deleted and created anew with `compression`.
    pub fn write_dataset(
        &mut self,
        path: &str,
        data: DatasetData,
        compression: CompressionMethod,
    ) -> Result<DatasetWrite> {
        let (group, _) = split_parent(path);
        self.create_group(&group)?;

        let outcome = match self.backend.container().dataset_info(path)? {
            None => DatasetWrite::Created,
            Some(info) if info == data.info() => {
                tracing::info!(path, "overwriting existing dataset");
                self.backend.container_mut().write_dataset(path, &data)?;
                return Ok(DatasetWrite::Overwritten);
            }
            Some(info) => {
                tracing::debug!(
                    path,
                    old_type = %info.data_type,
                    old_shape = ?info.shape,
                    "deleting incompatible dataset"
                );
                self.backend.container_mut().delete(path)?;
                DatasetWrite::Replaced
            }
        };

        let options = self.backend.dataset_options(data.shape(), compression);
        tracing::debug!(
            path,
            data_type = %data.data_type(),
            shape = ?data.shape(),
            chunks = ?options.chunks,
            "creating dataset"
        );
        self.backend
            .container_mut()
            .create_dataset(path, &data, &options)?;
        Ok(outcome)
    }

    fn vec3_attribute(&self, path: &str, name: &str) -> Result<Option<[f64; 3]>> {
        match self.backend.container().attribute(path, name)? {
            None => Ok(None),
            Some(value) => value.to_vec3().map(|v| Some(self.backend.spatial(v))).ok_or_else(|| {
                CremiError::InvalidFormat(format!(
                    "attribute '{}' of {} is not a 3-vector: {:?}",
                    name, path, value
                ))
            }),
        }
    }

    fn read_text(&self, path: &str) -> Result<Vec<String>> {
        let data = self.backend.container().read_dataset(path)?;
        let found = data.data_type();
        let texts = String::from_data(data).ok_or_else(|| CremiError::TypeMismatch {
            path: path.to_string(),
            expected: String::DATA_TYPE.to_string(),
            found: found.to_string(),
        })?;
        Ok(texts.iter().cloned().collect())
    }

    /// Write a volume to `path`.
    ///
    /// The element type of the volume is the stored type. Data is gzip
    /// compressed; `resolution` and `offset` are stored as attributes, as
    /// is `comment` when the volume has one. Non-finite `resolution` or
    /// `offset` components are rejected before anything is written.
    pub fn write_volume<T: Element>(&mut self, volume: &Volume<T>, path: &str) -> Result<()> {
        check_finite(path, RESOLUTION_ATTR, volume.resolution)?;
        check_finite(path, OFFSET_ATTR, volume.offset)?;
        self.write_dataset(path, T::into_data(volume.data.clone()), CompressionMethod::Gzip)?;

        let resolution = self.backend.spatial(volume.resolution);
        let offset = self.backend.spatial(volume.offset);
        let container = self.backend.container_mut();
        container.set_attribute(path, RESOLUTION_ATTR, resolution.into())?;
        container.set_attribute(path, OFFSET_ATTR, offset.into())?;
        if let Some(comment) = &volume.comment {
            container.set_attribute(path, COMMENT_ATTR, comment.as_str().into())?;
        }
        Ok(())
    }

    /// Read the volume at `path`; `resolution` must be present and a
    /// `comment`, if any, must be text
    pub fn read_volume<T: Element>(&self, path: &str) -> Result<Volume<T>> {
        let data = self.backend.container().read_dataset(path)?;
        let found = data.data_type();
        let data = T::from_data(data).ok_or_else(|| CremiError::TypeMismatch {
            path: path.to_string(),
            expected: T::DATA_TYPE.to_string(),
            found: found.to_string(),
        })?;

        let resolution =
            self.vec3_attribute(path, RESOLUTION_ATTR)?
                .ok_or_else(|| CremiError::MissingAttribute {
                    path: path.to_string(),
                    name: RESOLUTION_ATTR.to_string(),
                })?;
        let offset = self.vec3_attribute(path, OFFSET_ATTR)?.unwrap_or([0.0; 3]);
        let comment = match self.backend.container().attribute(path, COMMENT_ATTR)? {
            Some(AttrValue::Text(comment)) => Some(comment),
            Some(_) => {
                return Err(CremiError::TypeMismatch {
                    path: format!("{}@{}", path, COMMENT_ATTR),
                    expected: "text".to_string(),
                    found: "numeric attribute".to_string(),
                })
            }
            None => None,
        };

        Ok(Volume {
            data,
            resolution,
            offset,
            comment,
        })
    }

    pub fn has_volume(&self, path: &str) -> bool {
        self.backend.container().contains(path)
    }

    /// Write a raw volume
    pub fn write_raw(&mut self, raw: &Volume<u8>) -> Result<()> {
        self.write_volume(raw, RAW_PATH)
    }

    /// Write a volume of segmented neurons
    pub fn write_neuron_ids(&mut self, neuron_ids: &Volume<u64>) -> Result<()> {
        self.write_volume(neuron_ids, NEURON_IDS_PATH)
    }

    /// Write a volume of segmented synaptic clefts
    pub fn write_clefts(&mut self, clefts: &Volume<u64>) -> Result<()> {
        self.write_volume(clefts, CLEFTS_PATH)
    }

    pub fn read_raw(&self) -> Result<Volume<u8>> {
        self.read_volume(RAW_PATH)
    }

    pub fn read_neuron_ids(&self) -> Result<Volume<u64>> {
        self.read_volume(NEURON_IDS_PATH)
    }

    pub fn read_clefts(&self) -> Result<Volume<u64>> {
        self.read_volume(CLEFTS_PATH)
    }

    pub fn has_raw(&self) -> bool {
        self.has_volume(RAW_PATH)
    }

    pub fn has_neuron_ids(&self) -> bool {
        self.has_volume(NEURON_IDS_PATH)
    }

    pub fn has_neuron_ids_confidence(&self) -> bool {
        self.has_volume(NEURON_IDS_CONFIDENCE_PATH)
    }

    pub fn has_clefts(&self) -> bool {
        self.has_volume(CLEFTS_PATH)
    }

    /// Check if this file contains synaptic partner annotations
    pub fn has_annotations(&self) -> bool {
        self.backend.container().contains(ANNOTATIONS_PATH)
    }

    /// Check if this file contains segment annotations (stored under the
    /// same group as synaptic partner annotations)
    pub fn has_segment_annotations(&self) -> bool {
        self.has_annotations()
    }

    /// Write pre- and post-synaptic site annotations.
    ///
    /// An empty set writes nothing. Ids, types and locations are written in
    /// the set's current order; comments and partner links only when there
    /// are any.
    pub fn write_annotations(&mut self, annotations: &AnnotationSet) -> Result<()> {
        if annotations.is_empty() {
            return Ok(());
        }
        check_finite(ANNOTATIONS_PATH, OFFSET_ATTR, annotations.offset())?;

        self.create_group(ANNOTATIONS_PATH)?;
        let offset = self.backend.spatial(annotations.offset());
        self.backend
            .container_mut()
            .set_attribute(ANNOTATIONS_PATH, OFFSET_ATTR, offset.into())?;

        let ids = Array1::from(annotations.ids().to_vec());
        self.write_dataset(
            ANNOTATION_IDS_PATH,
            DatasetData::U64(ids.into_dyn()),
            CompressionMethod::None,
        )?;

        let types: Array1<String> = annotations.types().into_iter().map(String::from).collect();
        self.write_dataset(
            ANNOTATION_TYPES_PATH,
            DatasetData::Utf8(types.into_dyn()),
            CompressionMethod::Gzip,
        )?;

        let locations: Vec<f64> = annotations
            .locations()
            .into_iter()
            .flat_map(|location| self.backend.spatial(location))
            .collect();
        let locations = Array2::from_shape_vec((annotations.len(), 3), locations)?;
        self.write_dataset(
            ANNOTATION_LOCATIONS_PATH,
            DatasetData::F64(locations.into_dyn()),
            CompressionMethod::None,
        )?;

        if !annotations.comments().is_empty() {
            let (target_ids, comments): (Vec<u64>, Vec<String>) = annotations
                .ids()
                .iter()
                .filter_map(|&id| annotations.comment(id).map(|c| (id, c.to_string())))
                .unzip();
            self.write_dataset(
                COMMENT_TARGET_IDS_PATH,
                DatasetData::U64(Array1::from(target_ids).into_dyn()),
                CompressionMethod::None,
            )?;
            self.write_dataset(
                COMMENT_TEXTS_PATH,
                DatasetData::Utf8(Array1::from(comments).into_dyn()),
                CompressionMethod::None,
            )?;
        }

        let partners = annotations.pre_post_partners();
        if !partners.is_empty() {
            let flat: Vec<u64> = partners.iter().flat_map(|&(pre, post)| [pre, post]).collect();
            let partners = Array2::from_shape_vec((partners.len(), 2), flat)?;
            self.write_dataset(
                PARTNERS_PATH,
                DatasetData::U64(partners.into_dyn()),
                CompressionMethod::None,
            )?;
        }

        Ok(())
    }

    /// Read pre- and post-synaptic site annotations; empty if the file has
    /// none
    pub fn read_annotations(&self) -> Result<AnnotationSet> {
        let mut annotations = AnnotationSet::new();
        if !self.has_annotations() {
            return Ok(annotations);
        }

        if let Some(offset) = self.vec3_attribute(ANNOTATIONS_PATH, OFFSET_ATTR)? {
            annotations.set_offset(offset);
        }

        let container = self.backend.container();
        let ids = container.read_dataset(ANNOTATION_IDS_PATH)?.to_u64_vec()?;
        let types = self.read_text(ANNOTATION_TYPES_PATH)?;
        let locations = container
            .read_dataset(ANNOTATION_LOCATIONS_PATH)?
            .to_f64_vec()?;
        for ((id, kind), location) in ids.into_iter().zip(types).zip(locations.chunks_exact(3)) {
            let location = self.backend.spatial([location[0], location[1], location[2]]);
            annotations.add_annotation(id, kind, location);
        }

        if container.contains(ANNOTATION_COMMENTS_PATH) {
            let target_ids = container.read_dataset(COMMENT_TARGET_IDS_PATH)?.to_u64_vec()?;
            let comments = self.read_text(COMMENT_TEXTS_PATH)?;
            for (id, comment) in target_ids.into_iter().zip(comments) {
                annotations.add_comment(id, comment)?;
            }
        }

        if container.contains(PARTNERS_PATH) {
            let partners = container.read_dataset(PARTNERS_PATH)?.to_u64_vec()?;
            for pair in partners.chunks_exact(2) {
                annotations.set_pre_post_partners(pair[0], pair[1])?;
            }
        }

        Ok(annotations)
    }

    /// Read confidence information about neuron ids; empty if the file has
    /// none
    pub fn read_neuron_ids_confidence(&self) -> Result<Confidences> {
        if !self.has_neuron_ids_confidence() {
            return Ok(Confidences::default());
        }
        let stream = self
            .backend
            .container()
            .read_dataset(NEURON_IDS_CONFIDENCE_PATH)?
            .to_u64_vec()?;
        Confidences::from_stream(&stream)
    }

    /// Write confidence information about neuron ids
    pub fn write_neuron_ids_confidence(&mut self, confidences: &Confidences) -> Result<()> {
        let stream = Array1::from(confidences.to_stream());
        self.write_dataset(
            NEURON_IDS_CONFIDENCE_PATH,
            DatasetData::U64(stream.into_dyn()),
            CompressionMethod::Gzip,
        )?;
        Ok(())
    }
}

/// Reject non-finite components of a spatial attribute
fn check_finite(path: &str, name: &str, coords: [f64; 3]) -> Result<()> {
    if coords.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(CremiError::InvalidFormat(format!(
            "{} of {} must be finite, got {:?}",
            name, path, coords
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Log sink shared between a test and its subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn raw(fill: u8, shape: (usize, usize, usize)) -> Volume<u8> {
        Volume::new(Array3::from_elem(shape, fill), [40.0, 4.0, 4.0])
    }

    #[test]
    fn test_dataset_write_states() {
        let temp_dir = TempDir::new().unwrap();
        let mut file =
            CremiFile::open(temp_dir.path().join("states.hdf"), OpenMode::Create).unwrap();

        let first = DatasetData::U64(Array1::from(vec![1u64, 2, 3]).into_dyn());
        let same_shape = DatasetData::U64(Array1::from(vec![4u64, 5, 6]).into_dyn());
        let other_type = DatasetData::U8(Array1::from(vec![7u8, 8, 9]).into_dyn());

        assert_eq!(
            file.write_dataset("/a/b/ids", first, CompressionMethod::None).unwrap(),
            DatasetWrite::Created
        );
        assert_eq!(
            file.write_dataset("/a/b/ids", same_shape.clone(), CompressionMethod::None)
                .unwrap(),
            DatasetWrite::Overwritten
        );
        assert_eq!(file.container().read_dataset("/a/b/ids").unwrap(), same_shape);
        assert_eq!(
            file.write_dataset("/a/b/ids", other_type.clone(), CompressionMethod::Gzip)
                .unwrap(),
            DatasetWrite::Replaced
        );
        assert_eq!(file.container().read_dataset("/a/b/ids").unwrap(), other_type);
    }

    #[test]
    fn test_write_dataset_over_group_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("g.hdf"), OpenMode::Create).unwrap();
        file.write_dataset(
            "/volumes/labels/clefts",
            DatasetData::U64(Array1::from(vec![1u64]).into_dyn()),
            CompressionMethod::None,
        )
        .unwrap();
        assert!(matches!(
            file.write_dataset(
                "/volumes/labels",
                DatasetData::U64(Array1::from(vec![1u64]).into_dyn()),
                CompressionMethod::None,
            ),
            Err(CremiError::NotADataset(_))
        ));
    }

    #[test]
    fn test_volume_attributes() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("v.hdf"), OpenMode::Create).unwrap();

        file.write_raw(&raw(3, (2, 2, 2)).with_offset([80.0, 8.0, 4.0])).unwrap();
        let volume = file.read_raw().unwrap();
        assert_eq!(volume.resolution, [40.0, 4.0, 4.0]);
        assert_eq!(volume.offset, [80.0, 8.0, 4.0]);
        assert_eq!(volume.comment, None);
        assert_eq!(
            file.container().attribute(RAW_PATH, COMMENT_ATTR).unwrap(),
            None
        );
    }

    #[test]
    fn test_read_volume_defaults_and_requirements() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("v.hdf"), OpenMode::Create).unwrap();
        file.write_dataset(
            "/volumes/bare",
            DatasetData::U8(Array3::<u8>::zeros((1, 1, 1)).into_dyn()),
            CompressionMethod::None,
        )
        .unwrap();

        assert!(matches!(
            file.read_volume::<u8>("/volumes/bare"),
            Err(CremiError::MissingAttribute { .. })
        ));

        file.container_mut()
            .set_attribute("/volumes/bare", RESOLUTION_ATTR, [1.0, 2.0, 3.0].into())
            .unwrap();
        let volume = file.read_volume::<u8>("/volumes/bare").unwrap();
        assert_eq!(volume.offset, [0.0; 3]);

        assert!(matches!(
            file.read_volume::<u64>("/volumes/bare"),
            Err(CremiError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_has_queries() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("h.hdf"), OpenMode::Create).unwrap();
        assert!(!file.has_raw());
        assert!(!file.has_clefts());
        assert!(!file.has_annotations());

        let clefts = Volume::new(Array3::<u64>::zeros((1, 2, 2)), [40.0, 4.0, 4.0]);
        file.write_clefts(&clefts).unwrap();
        assert!(file.has_clefts());
        assert!(!file.has_neuron_ids());
        assert_eq!(file.read_clefts().unwrap(), clefts);
    }

    #[test]
    fn test_confidence_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("c.hdf"), OpenMode::Create).unwrap();
        assert!(file.read_neuron_ids_confidence().unwrap().is_empty());

        let mut confidences = Confidences::default();
        confidences.add_all(0, [11, 12]);
        confidences.add(1, 13);
        file.write_neuron_ids_confidence(&confidences).unwrap();

        assert!(file.has_neuron_ids_confidence());
        assert_eq!(file.read_neuron_ids_confidence().unwrap(), confidences);
    }

    #[test]
    fn test_truncated_confidence_stream() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("c.hdf"), OpenMode::Create).unwrap();
        file.write_dataset(
            NEURON_IDS_CONFIDENCE_PATH,
            DatasetData::U64(Array1::from(vec![0u64, 3, 1]).into_dyn()),
            CompressionMethod::None,
        )
        .unwrap();
        assert!(matches!(
            file.read_neuron_ids_confidence(),
            Err(CremiError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_overwrite_notice_logged_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("log.hdf"), OpenMode::Create).unwrap();

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let ids = DatasetData::U64(Array1::from(vec![1u64, 2]).into_dyn());
            let other = DatasetData::U8(Array1::from(vec![1u8, 2, 3]).into_dyn());
            file.write_dataset("/a/ids", ids.clone(), CompressionMethod::None)
                .unwrap();
            file.write_dataset("/a/ids", ids, CompressionMethod::None)
                .unwrap();
            file.write_dataset("/a/ids", other, CompressionMethod::None)
                .unwrap();
        });

        let output = logs.contents();
        assert_eq!(output.matches("overwriting existing dataset").count(), 1);
        assert!(output.contains("INFO"));
        assert!(output.contains("/a/ids"));
        // deleting an incompatible dataset is below the info level
        assert!(!output.contains("deleting incompatible dataset"));
    }

    #[test]
    fn test_non_text_comment_is_type_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("c.hdf"), OpenMode::Create).unwrap();
        file.write_raw(&raw(1, (1, 2, 2))).unwrap();
        file.container_mut()
            .set_attribute(RAW_PATH, COMMENT_ATTR, AttrValue::Ints(vec![7]))
            .unwrap();

        match file.read_raw() {
            Err(CremiError::TypeMismatch { path, expected, .. }) => {
                assert_eq!(path, "/volumes/raw@comment");
                assert_eq!(expected, "text");
            }
            other => panic!("expected a type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_spatial_attributes_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = CremiFile::open(temp_dir.path().join("f.hdf"), OpenMode::Create).unwrap();

        let volume = raw(1, (1, 1, 1)).with_offset([f64::INFINITY, 1.0, 2.0]);
        assert!(matches!(
            file.write_raw(&volume),
            Err(CremiError::InvalidFormat(_))
        ));
        assert!(!file.has_raw());

        let mut volume = raw(1, (1, 1, 1));
        volume.resolution = [40.0, f64::NAN, 4.0];
        assert!(matches!(
            file.write_raw(&volume),
            Err(CremiError::InvalidFormat(_))
        ));

        let mut annotations = AnnotationSet::new();
        annotations.add_annotation(1, "presynaptic_site", [1.0, 2.0, 3.0]);
        annotations.set_offset([0.0, f64::NEG_INFINITY, 0.0]);
        assert!(matches!(
            file.write_annotations(&annotations),
            Err(CremiError::InvalidFormat(_))
        ));
        assert!(!file.has_annotations());
    }
}
