mod common;

use std::path::Path;

use mrio_ingest::adapters::{CountryNames, PriceType, parse_eora26};
use mrio_ingest::config::EoraConfig;
use mrio_ingest::IngestError;
use tempfile::tempdir;

fn release_files() -> Vec<(&'static str, String)> {
    vec![
        (
            "labels_T.txt",
            common::tsv(&[
                &["Austria", "AUT", "Industries", "Agriculture"],
                &["Austria", "AUT", "Industries", "Mining"],
                &["Rest of the World", "ROW", "Industries", "Total"],
            ]),
        ),
        (
            "labels_FD.txt",
            common::tsv(&[
                &["Austria", "AUT", "Final Demand", "Household final consumption P.3h"],
                &["Rest of the World", "ROW", "Final Demand", "Household final consumption P.3h"],
            ]),
        ),
        (
            "labels_Q.txt",
            common::tsv(&[&["CO2 (Gg)", "Total"], &["Land (ha)", "Total"]]),
        ),
        (
            "labels_VA.txt",
            common::tsv(&[&["Compensation of employees D.1", "Primary input"]]),
        ),
        (
            "Eora26_2013_bp_T.txt",
            common::tsv(&[&["1", "2", "3"], &["4", "5", "6"], &["7", "8", "9"]]),
        ),
        (
            "Eora26_2013_bp_FD.txt",
            common::tsv(&[&["10", "1"], &["20", "2"], &["30", "3"]]),
        ),
        (
            "Eora26_2013_bp_Q.txt",
            common::tsv(&[&["1", "1", "5"], &["2", "2", "5"]]),
        ),
        ("Eora26_2013_bp_QY.txt", common::tsv(&[&["3", "1"], &["4", "1"]])),
        ("Eora26_2013_bp_VA.txt", common::tsv(&[&["100", "200", "50"]])),
    ]
}

fn write_release(root: &Path) {
    for (name, contents) in release_files() {
        common::write_file(root, name, &contents);
    }
}

#[test]
fn rest_of_world_is_removed_and_logged() {
    mrio_ingest::logging::init_test_tracing();
    let dir = tempdir().expect("temporary directory");
    write_release(dir.path());

    let system = parse_eora26(
        dir.path(),
        Some("2013"),
        PriceType::Bp,
        CountryNames::Eora,
        &EoraConfig::default(),
    )
    .expect("Eora parsed");

    assert_eq!(system.regions(), vec!["AUT"]);
    assert_eq!(system.sectors(), vec!["Agriculture", "Mining"]);
    assert_eq!(
        system.z.as_ref().expect("Z present").values().data(),
        &[1.0, 2.0, 4.0, 5.0]
    );
    assert_eq!(
        system.y.as_ref().expect("Y present").values().data(),
        &[10.0, 20.0]
    );

    let modifications: Vec<&str> = system
        .meta
        .modifications()
        .iter()
        .map(|entry| entry.text.as_str())
        .collect();
    assert_eq!(modifications.len(), 7);
    assert_eq!(
        modifications[0],
        "Removed rest of the world (ROW) columns from Z - losing 18"
    );
    assert_eq!(
        modifications[1],
        "Removed rest of the world (ROW) rows from Z - losing 15"
    );
    assert_eq!(
        modifications[6],
        "Removed rest of the world (ROW) columns from VA - losing 50"
    );

    let q = system.extension("Q").expect("Q extension");
    assert_eq!(q.unit.units(), &["Gg".to_string(), "ha".to_string()]);
    assert_eq!(
        q.stressors().expect("stressors").level_values(mrio_ingest::model::IndexLevel::Stressor),
        vec!["CO2", "Land"]
    );
    assert_eq!(q.f.as_ref().expect("F").values().data(), &[1.0, 1.0, 2.0, 2.0]);
    assert_eq!(q.f_y.as_ref().expect("F_Y").values().data(), &[3.0, 4.0]);
    assert_eq!(
        system.extension("VA").and_then(|va| va.f.as_ref()).expect("VA").values().data(),
        &[100.0, 200.0]
    );

    assert_eq!(system.meta.year.as_deref(), Some("2013"));
    assert!(
        system
            .meta
            .notes()
            .iter()
            .any(|entry| entry.text == "Set Eora monetary units to Mill USD manually")
    );
}

#[test]
fn full_country_names_and_zipped_release() {
    let dir = tempdir().expect("temporary directory");
    let members: Vec<(&str, Vec<u8>)> = release_files()
        .into_iter()
        .map(|(name, contents)| (name, contents.into_bytes()))
        .collect();
    let archive = dir.path().join("Eora26_2013_bp.zip");
    std::fs::write(&archive, common::zip_bytes(&members)).expect("archive written");

    let system = parse_eora26(
        &archive,
        None,
        PriceType::Pp,
        CountryNames::Full,
        &EoraConfig::default(),
    )
    .expect("Eora parsed");
    assert_eq!(system.regions(), vec!["Austria"]);
    assert_eq!(system.meta.year.as_deref(), Some("2013"));
    assert!(system.meta.file_io().iter().all(|entry| entry.text.contains("Eora26_2013_bp.zip")));
}

#[test]
fn folder_without_year_is_rejected() {
    let dir = tempdir().expect("temporary directory");
    write_release(dir.path());
    let err = parse_eora26(
        dir.path(),
        None,
        PriceType::Bp,
        CountryNames::Eora,
        &EoraConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IngestError::InvalidParameter(_)));
}
