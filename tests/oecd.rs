mod common;

use mrio_ingest::adapters::{OecdAdapter, SourceAdapter, parse_oecd};
use mrio_ingest::config::OecdConfig;
use mrio_ingest::IngestError;
use tempfile::tempdir;

const ICIO: &str = "\
,CHN_C01,CN1_C01,CN2_C01,AUT_C01,CHN_HFCE,AUT_HFCE,TOTAL
CHN_C01,1,2,3,4,5,6,21
CN1_C01,1,1,1,1,1,1,6
CN2_C01,2,2,2,2,2,2,12
AUT_C01,3,3,3,3,3,3,18
TAXSUB,1,1,1,1,0,0,4
VALU,10,10,10,10,0,0,40
OUTPUT,18,19,20,21,11,12,101
";

#[test]
fn sub_regions_are_folded_into_their_country() {
    let dir = tempdir().expect("temporary directory");
    common::write_file(dir.path(), "ICIO2018_2015.csv", ICIO);

    let system = parse_oecd(&dir.path().join("ICIO2018_2015.csv"), None, &OecdConfig::default())
        .expect("ICIO parsed");

    assert_eq!(system.regions(), vec!["CHN", "AUT"]);
    let z = system.z.as_ref().expect("Z present");
    assert_eq!(z.values().data(), &[15.0, 7.0, 9.0, 3.0]);
    // Interindustry flows before aggregation sum to 34.
    assert_eq!(z.sum(), 34.0);
    let y = system.y.as_ref().expect("Y present");
    assert_eq!(y.values().data(), &[8.0, 9.0, 3.0, 3.0]);

    let f = system
        .extension("factor_inputs")
        .and_then(|extension| extension.f.as_ref())
        .expect("factor inputs");
    assert_eq!(f.values().data(), &[3.0, 1.0, 30.0, 10.0]);

    assert_eq!(system.meta.version.as_deref(), Some("v2018"));
    assert_eq!(system.meta.year.as_deref(), Some("2015"));
    assert_eq!(system.meta.system.as_deref(), Some("ixi"));
    let modifications: Vec<String> = system
        .meta
        .modifications()
        .iter()
        .map(|entry| entry.text.clone())
        .collect();
    assert_eq!(
        modifications,
        vec![
            "Removed total column TOTAL - losing 202".to_string(),
            "Removed total row OUTPUT - losing 101".to_string(),
            "Aggregated sub-regions CN1, CN2 into CHN".to_string(),
        ]
    );
    assert!(
        system
            .unit
            .as_ref()
            .expect("units")
            .units()
            .iter()
            .all(|unit| unit == "Million USD")
    );
}

#[test]
fn folder_lookup_needs_a_year_and_a_unique_file() {
    let dir = tempdir().expect("temporary directory");
    common::write_file(dir.path(), "ICIO2018_2015.csv", ICIO);

    let adapter = OecdAdapter::new(OecdConfig::default())
        .expect("adapter built")
        .with_year(2015);
    let system = adapter.parse(dir.path()).expect("ICIO parsed");
    assert_eq!(system.regions(), vec!["CHN", "AUT"]);

    let err = parse_oecd(dir.path(), None, &OecdConfig::default()).unwrap_err();
    assert!(matches!(err, IngestError::InvalidParameter(_)));

    common::write_file(dir.path(), "ICIO2016_2015.csv", ICIO);
    let err = adapter.parse(dir.path()).unwrap_err();
    assert!(matches!(err, IngestError::InvalidParameter(_)));

    let err = parse_oecd(dir.path(), Some("1990"), &OecdConfig::default()).unwrap_err();
    assert!(matches!(err, IngestError::MissingSourceFile { .. }));
}

#[test]
fn zipped_release_is_read_from_its_csv_member() {
    let dir = tempdir().expect("temporary directory");
    let archive = dir.path().join("ICIO2016_2011.zip");
    std::fs::write(
        &archive,
        common::zip_bytes(&[("ICIO2016_2011.csv", ICIO.as_bytes().to_vec())]),
    )
    .expect("archive written");

    let system = parse_oecd(&archive, None, &OecdConfig::default()).expect("ICIO parsed");
    assert_eq!(system.meta.version.as_deref(), Some("v2016"));
    assert_eq!(system.meta.year.as_deref(), Some("2011"));
    assert_eq!(system.z.as_ref().expect("Z present").shape(), (2, 2));
}
