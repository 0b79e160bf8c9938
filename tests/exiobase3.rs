mod common;

use std::path::Path;

use mrio_ingest::adapters::parse_exiobase3;
use mrio_ingest::config::{Exiobase3Config, SniffConfig};
use mrio_ingest::model::IndexLevel;
use tempfile::tempdir;

fn write_release(root: &Path) {
    common::write_file(
        root,
        "Z.txt",
        &common::tsv(&[
            &["region", "", "AUT", "WWA"],
            &["sector", "", "food", "food"],
            &["region", "sector", "", ""],
            &["AUT", "food", "1", "2"],
            &["WWA", "food", "3", "4"],
        ]),
    );
    common::write_file(
        root,
        "Y.txt",
        &common::tsv(&[
            &["region", "", "AUT", "WWA"],
            &["category", "", "HH", "HH"],
            &["region", "sector", "", ""],
            &["AUT", "food", "5", "1"],
            &["WWA", "food", "0", "6"],
        ]),
    );
    common::write_file(
        root,
        "x.txt",
        &common::tsv(&[
            &["region", "sector", "indout"],
            &["AUT", "food", "8"],
            &["WWA", "food", "13"],
        ]),
    );
    common::write_file(
        root,
        "unit.txt",
        &common::tsv(&[
            &["region", "sector", "unit"],
            &["AUT", "food", "M.EUR"],
            &["WWA", "food", "M.EUR"],
        ]),
    );

    common::write_file(
        root,
        "air_emissions/F.txt",
        &common::tsv(&[
            &["region", "AUT", "WWA"],
            &["sector", "food", "food"],
            &["stressor", "", ""],
            &["CO2", "10", "20"],
        ]),
    );
    common::write_file(
        root,
        "air_emissions/F_Y.txt",
        &common::tsv(&[
            &["region", "AUT", "WWA"],
            &["category", "HH", "HH"],
            &["stressor", "", ""],
            &["CO2", "1", "2"],
        ]),
    );
    common::write_file(
        root,
        "air_emissions/unit.txt",
        &common::tsv(&[&["stressor", "unit"], &["CO2", "kg"]]),
    );

    common::write_file(
        root,
        "water/file_parameters.json",
        r#"{"files": {
            "F": {"name": "F.txt", "nr_index_col": "2", "nr_header": "2"},
            "F_hh": {"name": "F_hh.txt", "nr_index_col": 2, "nr_header": 2}
        }}"#,
    );
    common::write_file(
        root,
        "water/F.txt",
        &common::tsv(&[
            &["region", "", "AUT", "WWA"],
            &["sector", "", "food", "food"],
            &["Blue", "surface", "3", "4"],
        ]),
    );
    common::write_file(
        root,
        "water/F_hh.txt",
        &common::tsv(&[
            &["region", "", "AUT", "WWA"],
            &["category", "", "HH", "HH"],
            &["Blue", "surface", "1", "0"],
        ]),
    );
}

#[test]
fn release_folder_with_satellite_accounts() {
    mrio_ingest::logging::init_test_tracing();
    let dir = tempdir().expect("temporary directory");
    let root = dir.path().join("IOT_2011_pxp");
    write_release(&root);

    let system = parse_exiobase3(&root, &Exiobase3Config::default(), &SniffConfig::default())
        .expect("EXIOBASE 3 parsed");

    assert_eq!(system.meta.version.as_deref(), Some("3"));
    assert_eq!(system.meta.year.as_deref(), Some("2011"));
    assert_eq!(system.meta.system.as_deref(), Some("pxp"));
    assert_eq!(system.regions(), vec!["AT", "WA"]);
    assert_eq!(
        system.z.as_ref().expect("Z present").values().data(),
        &[1.0, 2.0, 3.0, 4.0]
    );
    assert_eq!(system.x.as_deref(), Some(&[8.0, 13.0][..]));
    assert_eq!(
        system.y.as_ref().expect("Y present").columns().level_values(IndexLevel::Region),
        vec!["AT", "WA"]
    );

    let air = system.extension("air_emissions").expect("air emissions");
    assert_eq!(air.unit.units(), &["kg".to_string()]);
    assert_eq!(air.f.as_ref().expect("F").values().data(), &[10.0, 20.0]);
    assert_eq!(air.f_y.as_ref().expect("F_Y").values().data(), &[1.0, 2.0]);

    let water = system.extension("water").expect("water");
    assert_eq!(
        water.stressors().expect("stressors").names(),
        &[IndexLevel::Stressor, IndexLevel::Compartment]
    );
    assert_eq!(water.f_y.as_ref().expect("F_Y").values().data(), &[1.0, 0.0]);
    assert_eq!(water.unit.units(), &["undef".to_string()]);

    let modifications: Vec<&str> = system
        .meta
        .modifications()
        .iter()
        .map(|entry| entry.text.as_str())
        .collect();
    assert_eq!(modifications, vec!["Renamed 2 region labels: AUT->AT, WWA->WA"]);
    assert!(
        system
            .meta
            .notes()
            .iter()
            .any(|entry| entry.text == "Final demand table F_hh of water renamed to F_Y")
    );
    assert!(
        system
            .meta
            .file_io()
            .iter()
            .any(|entry| entry.text.starts_with("File parameters read from"))
    );
}

#[test]
fn zipped_release_matches_the_folder() {
    let dir = tempdir().expect("temporary directory");
    let root = dir.path().join("IOT_2011_pxp");
    write_release(&root);
    let folder = parse_exiobase3(&root, &Exiobase3Config::default(), &SniffConfig::default())
        .expect("folder parsed");

    let mut members = Vec::new();
    for relative in [
        "Z.txt",
        "Y.txt",
        "x.txt",
        "unit.txt",
        "air_emissions/F.txt",
        "air_emissions/F_Y.txt",
        "air_emissions/unit.txt",
        "water/file_parameters.json",
        "water/F.txt",
        "water/F_hh.txt",
    ] {
        let bytes = std::fs::read(root.join(relative)).expect("fixture read");
        members.push((format!("IOT_2011_pxp/{relative}"), bytes));
    }
    let members: Vec<(&str, Vec<u8>)> = members
        .iter()
        .map(|(name, bytes)| (name.as_str(), bytes.clone()))
        .collect();
    let other = tempdir().expect("temporary directory");
    let archive = other.path().join("exiobase.zip");
    std::fs::write(&archive, common::zip_bytes(&members)).expect("archive written");

    let zipped = parse_exiobase3(&archive, &Exiobase3Config::default(), &SniffConfig::default())
        .expect("archive parsed");
    assert_eq!(zipped.z, folder.z);
    assert_eq!(zipped.y, folder.y);
    assert_eq!(zipped.x, folder.x);
    assert_eq!(zipped.extensions, folder.extensions);
    assert_eq!(zipped.meta.year.as_deref(), Some("2011"));
}
