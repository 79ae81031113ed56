//! Integration tests for container creation, band append and pixel I/O.

use geoh5::kea::{BandOptions, Container, CreateOptions, GeoTransform, OpenMode, RasterArray, Window};
use geoh5::store::format::HEADER_SIZE;
use geoh5::store::{Access, File, Mode};
use geoh5::util::{code_of, name_of};
use geoh5::{DataType, Error};
use ndarray::{Array2, Array3};
use tempfile::tempdir;

#[test]
fn test_create_declares_every_band() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("bands.kea");

    for (n, dtype) in [(1usize, DataType::Int8), (3, DataType::UInt16), (5, DataType::Float64)] {
        let opts = CreateOptions::new(40, 30, n, dtype).chunks(10, 10);
        Container::create(&path, &opts).unwrap().close().unwrap();

        let c = Container::open(&path, OpenMode::Read).unwrap();
        assert_eq!(c.count().unwrap(), n);
        let dtypes = c.dtypes().unwrap();
        assert_eq!(dtypes.keys().copied().collect::<Vec<_>>(), (1..=n).collect::<Vec<_>>());
        c.close().unwrap();

        // The persisted type code maps back to the requested name.
        let file = File::open(&path, Mode::Read, Access::Serial).unwrap();
        assert_eq!(file.read_values::<u16>("HEADER/NUMBANDS").unwrap(), vec![n as u16]);
        for band in 1..=n {
            let code = file.read_values::<u16>(&format!("BAND{}/DATATYPE", band)).unwrap()[0];
            assert_eq!(name_of(code).unwrap(), dtype.name());
            assert_eq!(code_of(dtype.name()).unwrap(), code);
        }
    }
}

#[test]
fn test_header_geometry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("geo.kea");
    let gt = GeoTransform::from_gdal([500000.0, 30.0, 0.0, 4200000.0, 0.0, -30.0]);
    let wkt = r#"PROJCS["WGS 84 / UTM zone 33N",GEOGCS["WGS 84"]]"#;
    let opts = CreateOptions::new(120, 80, 1, DataType::Float32)
        .chunks(40, 40)
        .georef(gt, wkt)
        .no_data(-9999.0f32)
        .band_names(["Elevation"]);
    Container::create(&path, &opts).unwrap().close().unwrap();

    let c = Container::open(&path, OpenMode::Read).unwrap();
    assert_eq!((c.width().unwrap(), c.height().unwrap()), (120, 80));
    assert_eq!(c.transform().unwrap(), gt);
    assert_eq!(c.crs_wkt().unwrap(), wkt);
    assert_eq!(c.metadata().unwrap()["Band_1"], "Elevation");
    assert_eq!(c.no_data().unwrap()[&1].map(|v| v.as_f64()), Some(-9999.0));

    let layout = c.layout().unwrap();
    assert_eq!(layout.filetype, "KEA");
    assert_eq!(layout.version, geoh5::kea::VERSION);

    let file = File::open(&path, Mode::Read, Access::Serial).unwrap();
    assert_eq!(file.read_values::<u64>("HEADER/SIZE").unwrap(), vec![120, 80]);
    assert_eq!(file.read_values::<f64>("HEADER/RES").unwrap(), vec![30.0, -30.0]);
    assert_eq!(file.read_values::<f64>("HEADER/TL").unwrap(), vec![500000.0, 4200000.0]);
}

#[test]
fn test_create_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.kea");

    let missing = CreateOptions { width: Some(10), ..Default::default() };
    assert!(Container::create(&path, &missing).unwrap_err().is_validation());

    let big_chunks = CreateOptions::new(10, 10, 1, DataType::UInt8).chunks(20, 5);
    assert!(Container::create(&path, &big_chunks).unwrap_err().is_validation());

    let bad_crs = CreateOptions::new(10, 10, 1, DataType::UInt8)
        .chunks(5, 5)
        .georef(GeoTransform::default(), "+proj=utm +zone=33");
    assert!(Container::create(&path, &bad_crs).unwrap_err().is_validation());
}

#[test]
fn test_band_name_mismatch_uses_defaults() {
    let dir = tempdir().unwrap();
    let opts = CreateOptions::new(10, 10, 3, DataType::UInt8)
        .chunks(5, 5)
        .band_names(["Red", "Green"]);
    let c = Container::create(dir.path().join("names.kea"), &opts).unwrap();
    let names = c.metadata().unwrap();
    assert_eq!(names["Band_1"], "Band 1");
    assert_eq!(names["Band_2"], "Band 2");
    assert_eq!(names["Band_3"], "Band 3");
}

#[test]
fn test_whole_image_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("whole.kea");
    let opts = CreateOptions::new(37, 23, 1, DataType::Float64).chunks(8, 16);
    let data = Array2::from_shape_fn((23, 37), |(r, c)| r as f64 * 0.25 - c as f64 * 1e-3);
    {
        let c = Container::create(&path, &opts).unwrap();
        c.write(&data, 1usize, None).unwrap();
        c.close().unwrap();
    }

    let c = Container::open(&path, OpenMode::Read).unwrap();
    let RasterArray::Float64(back) = c.read(1usize, None).unwrap() else {
        panic!("expected float64 data");
    };
    assert_eq!(back, data.into_dyn());
}

#[test]
fn test_window_writes_stay_inside_window() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("window.kea");
    let opts = CreateOptions::new(50, 40, 1, DataType::Int32).chunks(16, 16).no_data(-1i32);
    let c = Container::create(&path, &opts).unwrap();

    let win = Window::new(5..15, 20..32);
    let patch = Array2::from_shape_fn((10, 12), |(r, c)| (r * 100 + c) as i32);
    c.write(&patch, 1usize, Some(win.clone())).unwrap();
    c.close().unwrap();

    let c = Container::open(&path, OpenMode::Read).unwrap();
    assert_eq!(c.read_as::<i32>(1usize, Some(win)).unwrap(), patch.into_dyn());
    let disjoint = c.read_as::<i32>(1usize, Some(Window::new(20..40, 0..50))).unwrap();
    assert!(disjoint.iter().all(|&v| v == -1));
}

#[test]
fn test_out_of_range_window_fails() {
    let dir = tempdir().unwrap();
    let opts = CreateOptions::new(10, 10, 1, DataType::UInt8).chunks(5, 5);
    let c = Container::create(dir.path().join("range.kea"), &opts).unwrap();
    let err = c.read(1usize, Some(Window::new(5..12, 0..10))).unwrap_err();
    assert!(matches!(err, Error::InvalidSelection(_)));
}

#[test]
fn test_append_k_bands() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("append.kea");
    let opts = CreateOptions::new(20, 20, 2, DataType::UInt8).chunks(10, 10);
    let base = Array3::from_shape_fn((2, 20, 20), |(b, r, c)| (b * 50 + r + c) as u8);
    {
        let c = Container::create(&path, &opts).unwrap();
        c.write(&base, [1usize, 2], None).unwrap();
        c.close().unwrap();
    }

    let appended = [DataType::Int16, DataType::Float32, DataType::UInt32];
    let c = Container::open(&path, OpenMode::ReadWrite).unwrap();
    for (i, dtype) in appended.iter().enumerate() {
        let band = c
            .add_image_band(&BandOptions::new(*dtype).chunks(10, 10).description(format!("extra {}", i)))
            .unwrap();
        assert_eq!(band, 3 + i);
    }
    c.close().unwrap();

    let c = Container::open(&path, OpenMode::Read).unwrap();
    assert_eq!(c.count().unwrap(), 5);
    let dtypes = c.dtypes().unwrap();
    for (i, dtype) in appended.iter().enumerate() {
        assert_eq!(dtypes[&(3 + i)], *dtype);
        assert_eq!(c.descriptions().unwrap()[&(3 + i)], format!("extra {}", i));
    }
    assert_eq!(c.read_as::<u8>([1usize, 2], None).unwrap(), base.into_dyn());
}

#[test]
fn test_promoted_dtype() {
    let dir = tempdir().unwrap();
    let opts = CreateOptions::new(10, 10, 1, DataType::Int16).chunks(5, 5);
    let c = Container::create(dir.path().join("mixed.kea"), &opts).unwrap();
    c.add_image_band(&BandOptions::new(DataType::Float32).chunks(5, 5)).unwrap();

    assert_eq!(c.dtype().unwrap(), DataType::Float32);
    let read = c.read([1usize, 2], None).unwrap();
    assert_eq!(read.dtype(), DataType::Float32);
}

#[test]
fn test_two_band_scenario() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.kea");
    let opts = CreateOptions::new(100, 100, 2, DataType::UInt8).chunks(25, 25);
    {
        let c = Container::create(&path, &opts).unwrap();
        c.write(&Array2::from_elem((100, 100), 7u8), 1usize, None).unwrap();
        c.write(&Array2::from_elem((100, 100), 9u8), 2usize, None).unwrap();
        c.close().unwrap();
    }

    let c = Container::open(&path, OpenMode::Read).unwrap();
    let RasterArray::UInt8(planes) = c.read([2usize, 1], None).unwrap() else {
        panic!("expected uint8 data");
    };
    assert_eq!(planes.shape(), &[2, 100, 100]);
    assert!(planes.index_axis(ndarray::Axis(0), 0).iter().all(|&v| v == 9));
    assert!(planes.index_axis(ndarray::Axis(0), 1).iter().all(|&v| v == 7));
}

#[test]
fn test_duplicate_bands_in_read() {
    let dir = tempdir().unwrap();
    let opts = CreateOptions::new(4, 4, 2, DataType::UInt8).chunks(2, 2);
    let c = Container::create(dir.path().join("dup.kea"), &opts).unwrap();
    c.write(&Array2::from_elem((4, 4), 3u8), 1usize, None).unwrap();

    let out = c.read_as::<u8>(vec![1usize, 2, 1], None).unwrap();
    assert_eq!(out.shape(), &[3, 4, 4]);
    assert_eq!(out[[0, 0, 0]], 3);
    assert_eq!(out[[1, 0, 0]], 0);
    assert_eq!(out[[2, 3, 3]], 3);
}

#[test]
fn test_closed_and_read_only_handles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("handles.kea");
    let opts = CreateOptions::new(8, 8, 1, DataType::UInt8).chunks(4, 4);
    Container::create(&path, &opts).unwrap().close().unwrap();

    let c = Container::open(&path, OpenMode::Read).unwrap();
    let plane = Array2::<u8>::zeros((8, 8));
    assert!(matches!(c.write(&plane, 1usize, None), Err(Error::ReadOnly)));
    assert!(matches!(c.add_image_band(&BandOptions::new(DataType::UInt8).chunks(4, 4)), Err(Error::ReadOnly)));

    c.close().unwrap();
    assert!(matches!(c.count(), Err(Error::Closed)));
    assert!(matches!(c.read(1usize, None), Err(Error::Closed)));
    assert!(matches!(c.read_rat(1, None, 0, None), Err(Error::Closed)));
}

#[test]
fn test_interrupted_append_keeps_existing_bands() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("interrupted.kea");
    let opts = CreateOptions::new(16, 16, 1, DataType::UInt8).chunks(8, 8);
    let band1 = Array2::from_shape_fn((16, 16), |(r, c)| (r * 16 + c) as u8);
    {
        let c = Container::create(&path, &opts).unwrap();
        c.write(&band1, 1usize, None).unwrap();
        c.close().unwrap();
    }
    let committed = std::fs::read(&path).unwrap()[..HEADER_SIZE].to_vec();

    {
        let c = Container::open(&path, OpenMode::ReadWrite).unwrap();
        c.add_image_band(&BandOptions::new(DataType::Float32).chunks(8, 8)).unwrap();
        c.write(&Array2::from_elem((16, 16), 2.5f32), 2usize, None).unwrap();
        c.close().unwrap();
    }

    // Put back the header of the last complete commit and tear the tail, as
    // left by a writer that died part way through appending the new band.
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[..HEADER_SIZE].copy_from_slice(&committed);
    bytes.truncate(bytes.len() - 7);
    std::fs::write(&path, &bytes).unwrap();

    let c = Container::open(&path, OpenMode::Read).unwrap();
    assert_eq!(c.count().unwrap(), 1);
    assert_eq!(c.read_as::<u8>(1usize, None).unwrap(), band1.clone().into_dyn());
    c.close().unwrap();

    // The file can still be appended to.
    let c = Container::open(&path, OpenMode::ReadWrite).unwrap();
    assert_eq!(c.add_image_band(&BandOptions::new(DataType::UInt8).chunks(8, 8)).unwrap(), 2);
    c.close().unwrap();
    let c = Container::open(&path, OpenMode::Read).unwrap();
    assert_eq!(c.count().unwrap(), 2);
    assert_eq!(c.read_as::<u8>(1usize, None).unwrap(), band1.into_dyn());
}
