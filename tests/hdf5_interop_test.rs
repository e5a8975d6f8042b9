//! Files written through the crate are plain HDF5, and plain HDF5 files laid
//! out the CREMI way read back through the crate.

use cremi::{AnnotationSet, CremiFile, OpenMode, Volume, POSTSYNAPTIC_SITE, PRESYNAPTIC_SITE};
use hdf5::types::VarLenUnicode;
use ndarray::Array3;
use std::str::FromStr;
use tempfile::TempDir;

fn raw_volume() -> Volume<u8> {
    let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 12 + y * 4 + x) as u8);
    Volume::new(data, [40.0, 4.0, 4.0]).with_offset([80.0, 8.0, 0.0])
}

#[test]
fn test_written_file_opens_in_hdf5() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("sample.hdf");

    let mut file = CremiFile::open(&path, OpenMode::Create)?;
    file.write_raw(&raw_volume())?;
    let mut annotations = AnnotationSet::new();
    annotations.add_annotation(1, PRESYNAPTIC_SITE, [10.0, 20.0, 30.0]);
    annotations.add_annotation(2, POSTSYNAPTIC_SITE, [11.0, 21.0, 31.0]);
    annotations.set_pre_post_partners(1, 2)?;
    file.write_annotations(&annotations)?;
    file.close()?;

    let h5 = hdf5::File::open(&path)?;
    let version = h5.attr("file_format")?.read_scalar::<VarLenUnicode>()?;
    assert_eq!(version.as_str(), "0.2");

    let raw = h5.dataset("volumes/raw")?;
    assert_eq!(raw.shape(), vec![2, 3, 4]);
    assert_eq!(raw.read_raw::<u8>()?, raw_volume().data.iter().copied().collect::<Vec<_>>());
    assert_eq!(raw.attr("resolution")?.read_raw::<f64>()?, vec![40.0, 4.0, 4.0]);
    assert_eq!(raw.attr("offset")?.read_raw::<f64>()?, vec![80.0, 8.0, 0.0]);

    let ids = h5.dataset("annotations/ids")?;
    assert_eq!(ids.read_raw::<u64>()?, vec![1, 2]);
    let types: Vec<String> = h5
        .dataset("annotations/types")?
        .read_raw::<VarLenUnicode>()?
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();
    assert_eq!(types, vec![PRESYNAPTIC_SITE, POSTSYNAPTIC_SITE]);
    let partners = h5.dataset("annotations/presynaptic_site/partners")?;
    assert_eq!(partners.shape(), vec![1, 2]);
    assert_eq!(partners.read_raw::<u64>()?, vec![1, 2]);
    Ok(())
}

#[test]
fn test_foreign_hdf5_file_reads_back() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("foreign.hdf");

    {
        let h5 = hdf5::File::create(&path)?;
        let volumes = h5.create_group("volumes")?;
        let raw = volumes.new_dataset::<u8>().shape(vec![2, 3, 4]).create("raw")?;
        let values: Vec<u8> = (0..24).collect();
        raw.write_raw(&values)?;
        let resolution = raw.new_attr::<f64>().shape((3,)).create("resolution")?;
        resolution.write_raw(&[40.0, 4.0, 4.0])?;

        let group = h5.create_group("annotations")?;
        let offset = group.new_attr::<f64>().shape((3,)).create("offset")?;
        offset.write_raw(&[0.0, 100.0, 200.0])?;
        let ids = group.new_dataset::<u64>().shape(vec![2]).create("ids")?;
        ids.write_raw(&[7u64, 8])?;
        let types = group.new_dataset::<VarLenUnicode>().shape(vec![2]).create("types")?;
        types.write_raw(&[
            VarLenUnicode::from_str(PRESYNAPTIC_SITE)?,
            VarLenUnicode::from_str(POSTSYNAPTIC_SITE)?,
        ])?;
        let locations = group.new_dataset::<f64>().shape(vec![2, 3]).create("locations")?;
        locations.write_raw(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    }

    let file = CremiFile::open(&path, OpenMode::Read)?;
    assert!(file.has_raw());
    assert!(!file.has_neuron_ids());

    let raw = file.read_raw()?;
    assert_eq!(raw.data.shape(), &[2, 3, 4]);
    assert_eq!(raw.data[[1, 2, 3]], 23);
    assert_eq!(raw.resolution, [40.0, 4.0, 4.0]);
    assert_eq!(raw.offset, [0.0; 3]);
    assert_eq!(raw.comment, None);

    let annotations = file.read_annotations()?;
    assert_eq!(annotations.offset(), [0.0, 100.0, 200.0]);
    assert_eq!(annotations.ids(), &[7, 8]);
    assert_eq!(annotations.types(), vec![PRESYNAPTIC_SITE, POSTSYNAPTIC_SITE]);
    assert_eq!(annotations.locations(), vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    assert!(annotations.pre_post_partners().is_empty());
    Ok(())
}
