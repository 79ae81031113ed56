//! Integration tests for raster attribute tables.

use geoh5::kea::{Column, ColumnData, Container, CreateOptions, LayerType, OpenMode, RatTable};
use geoh5::store::{Access, ElementType, File, Mode};
use geoh5::{DataType, Error};
use tempfile::tempdir;

fn mixed_table() -> RatTable {
    RatTable::new(vec![
        Column::new("Histogram", ColumnData::Int(vec![10, 0, 42, 7, 3, 99])),
        Column::new("ClassName", ColumnData::String(vec![
            "".into(),
            "water".into(),
            "forest".into(),
            "urban".into(),
            "crops".into(),
            "bare soil".into(),
        ])),
        Column::new("Mean", ColumnData::Float(vec![0.0, 1.5, -2.25, 3.0, 1e9, f64::MIN_POSITIVE])),
        Column::new("Selected", ColumnData::Bool(vec![true, false, false, true, true, false])),
        Column::new("Red", ColumnData::Int(vec![0, 0, 34, 200, 255, 128])).with_usage("Red"),
    ])
}

fn container(path: &std::path::Path) -> Container {
    let opts = CreateOptions::new(16, 16, 2, DataType::UInt8).chunks(8, 8);
    Container::create(path, &opts).unwrap()
}

#[test]
fn test_mixed_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rat.kea");
    let table = mixed_table();
    {
        let c = container(&path);
        c.write_rat(1, &table, 1000, 1).unwrap();
        c.close().unwrap();
    }

    let c = Container::open(&path, OpenMode::Read).unwrap();
    let back = c.read_rat(1, None, 0, None).unwrap();
    assert_eq!(back, table);

    let lookup = c.layout().unwrap().band(1).unwrap().rat.clone().unwrap();
    assert_eq!(lookup.rows, 6);
    assert_eq!(lookup.chunk_size, 1000);
    let names: Vec<&str> = lookup.columns.iter().map(|col| col.name.as_str()).collect();
    assert_eq!(names, ["Histogram", "ClassName", "Mean", "Selected", "Red"]);
    assert_eq!(lookup.column("Red").unwrap().local, 1);

    // Writing a table leaves the layer type alone.
    assert_eq!(c.layer_types().unwrap()[&1], LayerType::Continuous);
    assert!(c.layout().unwrap().band(2).unwrap().rat.is_none());
}

#[test]
fn test_bucket_layout_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buckets.kea");
    {
        let c = container(&path);
        c.write_rat(2, &mixed_table(), 4, 0).unwrap();
        c.close().unwrap();
    }

    let file = File::open(&path, Mode::Read, Access::Serial).unwrap();
    assert_eq!(file.read_values::<u64>("BAND2/ATT/HEADER/SIZE").unwrap(), vec![6, 1, 2, 1, 1]);
    assert_eq!(file.read_values::<u64>("BAND2/ATT/HEADER/CHUNKSIZE").unwrap(), vec![4]);

    let ints = file.dataset("BAND2/ATT/DATA/INT").unwrap();
    assert_eq!(ints.shape().unwrap().sizes(), [6, 2]);
    assert_eq!(ints.chunks().unwrap().unwrap().sizes(), [4, 1]);
    assert_eq!(ints.element_type().unwrap(), ElementType::Numeric(DataType::Int64));
    assert_eq!(file.read_values::<u32>("BAND2/ATT/HEADER/INT_FIELDS/COLNUM").unwrap(), vec![0, 4]);
    assert_eq!(file.read_values::<u32>("BAND2/ATT/HEADER/INT_FIELDS/INDEX").unwrap(), vec![0, 1]);
    assert_eq!(
        file.dataset("BAND2/ATT/DATA/STRING").unwrap().element_type().unwrap(),
        ElementType::VarString
    );
}

#[test]
fn test_column_and_row_selection() {
    let dir = tempdir().unwrap();
    let c = container(&dir.path().join("select.kea"));
    c.write_rat(1, &mixed_table(), 2, 1).unwrap();

    let one = c.read_rat(1, Some(&["Mean"]), 1, Some(4)).unwrap();
    assert_eq!(one.columns.len(), 1);
    assert_eq!(one.columns[0].data, ColumnData::Float(vec![1.5, -2.25, 3.0]));

    let reordered = c.read_rat(1, Some(&["Red", "ClassName"]), 4, None).unwrap();
    assert_eq!(reordered.rows(), 2);
    assert_eq!(reordered.columns[0].name, "Red");
    assert_eq!(reordered.columns[0].usage, "Red");
    assert_eq!(reordered.columns[0].data, ColumnData::Int(vec![255, 128]));
    assert_eq!(
        reordered.columns[1].data,
        ColumnData::String(vec!["crops".into(), "bare soil".into()])
    );

    for (r0, r1) in [(0u64, 6u64), (2, 5), (3, 3)] {
        let slice = c.read_rat(1, Some(&["Selected"]), r0, Some(r1)).unwrap();
        assert_eq!(slice.rows() as u64, r1 - r0);
    }
}

#[test]
fn test_overwrite_drops_stale_buckets() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("overwrite.kea");
    let c = container(&path);
    c.write_rat(1, &mixed_table(), 1000, 1).unwrap();

    let smaller = RatTable::new(vec![
        Column::new("Area", ColumnData::Float(vec![1.0, 2.0, 3.0])),
        Column::new("Histogram", ColumnData::Int(vec![5, 6, 7])),
    ]);
    c.write_rat(1, &smaller, 1000, 1).unwrap();
    assert_eq!(c.read_rat(1, None, 0, None).unwrap(), smaller);
    c.close().unwrap();

    let file = File::open(&path, Mode::Read, Access::Serial).unwrap();
    assert!(!file.exists("BAND1/ATT/DATA/STRING").unwrap());
    assert!(!file.exists("BAND1/ATT/DATA/BOOL").unwrap());
    assert!(!file.exists("BAND1/ATT/HEADER/STRING_FIELDS").unwrap());
}

#[test]
fn test_errors() {
    let dir = tempdir().unwrap();
    let c = container(&dir.path().join("errors.kea"));
    c.write_rat(1, &mixed_table(), 1000, 1).unwrap();

    assert!(c.read_rat(0, None, 0, None).unwrap_err().is_lookup());
    assert!(c.read_rat(3, None, 0, None).unwrap_err().is_lookup());
    assert!(c.read_rat(2, None, 0, None).unwrap_err().is_lookup());
    assert!(c.read_rat(1, Some(&["Mean", "Nope"]), 0, None).unwrap_err().is_lookup());
    assert!(matches!(c.read_rat(1, None, 0, Some(7)), Err(Error::InvalidSelection(_))));

    assert!(c.write_rat(9, &mixed_table(), 1000, 1).unwrap_err().is_lookup());
    let ragged = RatTable::new(vec![
        Column::new("a", ColumnData::Int(vec![1, 2])),
        Column::new("b", ColumnData::Int(vec![1])),
    ]);
    assert!(c.write_rat(1, &ragged, 1000, 1).unwrap_err().is_validation());
}
