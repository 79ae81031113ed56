//! Parallel-mode creation, tiled writes from several workers and the string
//! repair pass.

use std::path::Path;

use geoh5::kea::tiling::{generate_tiles, rank_tiles};
use geoh5::kea::{
    rewrite_strings, Column, ColumnData, Container, CreateOptions, GeoTransform, OpenMode, RatTable, Window,
};
use geoh5::store::{Access, ElementType, File, Mode};
use geoh5::{DataType, Error};
use ndarray::Array2;
use rayon::prelude::*;
use tempfile::tempdir;

const WIDTH: u64 = 96;
const HEIGHT: u64 = 64;
const RANKS: usize = 4;

fn options() -> CreateOptions {
    CreateOptions::new(WIDTH, HEIGHT, 2, DataType::UInt16)
        .chunks(32, 32)
        .georef(
            GeoTransform::from_gdal([100.0, 2.0, 0.0, 900.0, 0.0, -2.0]),
            r#"GEOGCS["WGS 84",DATUM["WGS_1984"]]"#,
        )
        .band_names(["Red", "NIR"])
}

fn pixel(band: usize, row: u64, col: u64) -> u16 {
    (band as u64 * 10_000 + row * WIDTH + col) as u16
}

fn tile_data(band: usize, tile: &Window) -> Array2<u16> {
    Array2::from_shape_fn((tile.height() as usize, tile.width() as usize), |(r, c)| {
        pixel(band, tile.rows.start + r as u64, tile.cols.start + c as u64)
    })
}

fn text_kind(path: &Path, field: &str) -> ElementType {
    let file = File::open(path, Mode::Read, Access::Serial).unwrap();
    file.dataset(field).unwrap().element_type().unwrap()
}

#[test]
fn test_parallel_matches_serial_after_repair() {
    let dir = tempdir().unwrap();
    let par_path = dir.path().join("parallel.kea");
    let ser_path = dir.path().join("serial.kea");

    // Compression is requested but refused in parallel mode.
    let par = Container::create(&par_path, &options().compression(3).parallel(true)).unwrap();
    assert!(par.is_parallel());

    let tiles = generate_tiles(WIDTH, HEIGHT, 20, 24);
    (0..RANKS)
        .into_par_iter()
        .try_for_each(|rank| {
            for tile in rank_tiles(&tiles, rank, RANKS) {
                for band in 1..=2usize {
                    par.write(&tile_data(band, &tile), band, Some(tile.clone()))?;
                }
            }
            Ok::<_, geoh5::Error>(())
        })
        .unwrap();
    par.close().unwrap();

    assert_eq!(text_kind(&par_path, "BAND1/DESCRIPTION"), ElementType::FixedString(1));
    assert!(matches!(text_kind(&par_path, "HEADER/WKT"), ElementType::FixedString(_)));

    let converted = rewrite_strings(&par_path).unwrap();
    assert!(converted > 0);
    assert_eq!(text_kind(&par_path, "BAND1/DESCRIPTION"), ElementType::VarString);
    assert_eq!(text_kind(&par_path, "METADATA/Band_2"), ElementType::VarString);

    let ser = Container::create(&ser_path, &options().compression(0)).unwrap();
    let full = Window::full(WIDTH, HEIGHT);
    for band in 1..=2usize {
        ser.write(&tile_data(band, &full), band, None).unwrap();
    }
    ser.close().unwrap();

    let par = Container::open(&par_path, OpenMode::Read).unwrap();
    let ser = Container::open(&ser_path, OpenMode::Read).unwrap();
    assert_eq!(par.crs_wkt().unwrap(), ser.crs_wkt().unwrap());
    assert_eq!(par.descriptions().unwrap(), ser.descriptions().unwrap());
    assert_eq!(par.metadata().unwrap(), ser.metadata().unwrap());
    assert_eq!(par.transform().unwrap(), ser.transform().unwrap());

    let (pl, sl) = (par.layout().unwrap(), ser.layout().unwrap());
    assert_eq!((&pl.version, &pl.filetype, &pl.generator), (&sl.version, &sl.filetype, &sl.generator));
    assert!(pl.bands.iter().all(|b| b.compression == 0));
    assert!(sl.bands.iter().all(|b| b.compression == 0));

    assert_eq!(par.read_as::<u16>([1usize, 2], None).unwrap(), ser.read_as::<u16>([1usize, 2], None).unwrap());
}

#[test]
fn test_parallel_restrictions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("restricted.kea");
    let c = Container::create(&path, &options().parallel(true)).unwrap();

    // Numeric tables are fine; string columns wait for a serial pass.
    let numeric = RatTable::new(vec![Column::new("Histogram", ColumnData::Int(vec![1, 2, 3]))]);
    c.write_rat(1, &numeric, 1000, 1).unwrap();
    assert_eq!(c.read_rat(1, None, 0, None).unwrap(), numeric);

    let strings = RatTable::new(vec![Column::new("Name", ColumnData::String(vec!["a".into()]))]);
    assert!(c.write_rat(1, &strings, 1000, 0).unwrap_err().is_validation());

    // Fixed-length text can be overwritten in place but not grown.
    c.write_description(1, "r").unwrap();
    assert_eq!(c.descriptions().unwrap()[&1], "r");
    assert!(c.write_description(1, "much longer text").unwrap_err().is_validation());
    c.close().unwrap();

    rewrite_strings(&path).unwrap();
    let c = Container::open(&path, OpenMode::ReadWrite).unwrap();
    c.write_description(1, "much longer text").unwrap();
    c.write_rat(1, &RatTable::new(vec![Column::new("Name", ColumnData::String(vec!["a".into()]))]), 1000, 0)
        .unwrap();
    assert_eq!(c.descriptions().unwrap()[&1], "much longer text");
}

#[test]
fn test_parallel_handles_keep_each_others_windows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ranks.kea");
    let opts = CreateOptions::new(10, 10, 1, DataType::UInt8).chunks(5, 5).parallel(true);
    let rank0 = Container::create(&path, &opts).unwrap();
    let rank1 = Container::open_with(&path, OpenMode::ReadWrite, Access::Collective).unwrap();
    assert!(rank1.is_parallel());

    rank0
        .write(&Array2::from_elem((5, 10), 1u8), 1usize, Some(Window::new(0..5, 0..10)))
        .unwrap();
    rank1
        .write(&Array2::from_elem((5, 10), 2u8), 1usize, Some(Window::new(5..10, 0..10)))
        .unwrap();

    // Structural changes from two handles cannot both be committed.
    let table = RatTable::new(vec![Column::new("Histogram", ColumnData::Int(vec![4, 6]))]);
    rank0.write_rat(1, &table, 1000, 0).unwrap();
    rank0.close().unwrap();
    rank1.write_rat(1, &table, 1000, 0).unwrap();
    assert!(matches!(rank1.close(), Err(Error::Conflict(_))));

    let c = Container::open(&path, OpenMode::Read).unwrap();
    let image = c.read_as::<u8>(1usize, None).unwrap();
    for (row, values) in image.outer_iter().enumerate() {
        let expected = if row < 5 { 1 } else { 2 };
        assert!(values.iter().all(|&v| v == expected), "row {}", row);
    }
    assert_eq!(c.read_rat(1, None, 0, None).unwrap(), table);
}
