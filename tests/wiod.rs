mod common;

use mrio_ingest::adapters::{NameScheme, SourceAdapter, WiodAdapter, parse_wiod};
use mrio_ingest::config::WiodConfig;
use mrio_ingest::logging::init_test_tracing;
use mrio_ingest::{IngestError, ParseWarning};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Two regions (AUS, ROM) with two sectors each, two final demand
/// categories per region and three factor input rows.
fn wiot_rows() -> Vec<Vec<String>> {
    let header: &[&[&str]] = &[
        &["World Input-Output Table 2008"],
        &[],
        &["(industry-by-industry)", "", "", "", "AtB", "C", "AtB", "C", "CONS_h", "GFCF", "CONS_h", "GFCF"],
        &["(millions of US$)", "", "", "", "Agriculture", "Mining", "Agriculture", "Mining", "Final consumption", "Capital formation", "Final consumption", "Capital formation"],
        &["", "", "", "", "AUS", "AUS", "ROM", "ROM", "AUS", "AUS", "ROM", "ROM"],
        &["", "", "", "", "c1", "c35", "c1", "c35", "c37", "c41", "c37", "c41"],
        &["AtB", "Agriculture", "AUS", "c1", "1", "2", "3", "4", "10", "1", "0", "0"],
        &["C", "Mining", "AUS", "c35", "5", "6", "7", "8", "20", "2", "0", "0"],
        &["AtB", "Agriculture", "ROM", "c1", "9", "10", "11", "12", "0", "0", "30", "3"],
        &["C", "Mining", "ROM", "c35", "13", "14", "15", "16", "0", "0", "40", "4"],
        &["r60", "Total intermediate consumption", "", "r60", "28", "32", "36", "40"],
        &["r64", "Value added", "", "r64", "100", "200", "300", "400"],
        &["r69", "Output at basic prices", "", "r69", "128", "232", "336", "440"],
    ];
    common::rows(header)
}

fn wiot(dir: &Path) -> PathBuf {
    let path = dir.join("wiot08_row_apr12.xlsx");
    common::write_workbook(&path, &[("WIOT_08", wiot_rows())]);
    path
}

fn config() -> WiodConfig {
    WiodConfig {
        drop_total_column: false,
        ..WiodConfig::default()
    }
}

#[test]
fn workbook_yields_core_and_factor_inputs() {
    init_test_tracing();
    let dir = tempdir().expect("temporary directory");
    let path = wiot(dir.path());

    let system = parse_wiod(&path, None, &config()).expect("WIOD parsed");

    let z = system.z.as_ref().expect("Z present");
    let y = system.y.as_ref().expect("Y present");
    assert_eq!(z.shape(), (4, 4));
    assert_eq!(y.shape(), (4, 4));
    assert_eq!(system.regions(), vec!["AUS", "ROU"]);
    assert_eq!(system.sectors(), vec!["AtB", "C"]);
    assert_eq!(z.get(3, 0), 13.0);
    assert_eq!(y.get(2, 2), 30.0);

    let factor_inputs = system.extension("factor_inputs").expect("factor inputs");
    let f = factor_inputs.f.as_ref().expect("F present");
    assert_eq!(f.shape(), (1, 4));
    assert_eq!(f.values().data(), &[100.0, 200.0, 300.0, 400.0]);
    assert_eq!(factor_inputs.f_y.as_ref().expect("F_Y present").sum(), 0.0);

    assert_eq!(system.meta.year.as_deref(), Some("2008"));
    assert_eq!(system.meta.system.as_deref(), Some("industry-by-industry"));
    let unit = system.unit.as_ref().expect("units");
    assert!(unit.units().iter().all(|unit| unit == "millions of US$"));

    // r60 and r69 removed, ROM renamed.
    let modifications = system.meta.modifications();
    assert_eq!(modifications.len(), 3);
    assert!(modifications[0].text.contains("r60"));
    assert!(modifications[1].text.contains("r69"));
    assert!(modifications[2].text.contains("ROM->ROU"));

    // Neither SEA nor any environmental account sits next to the workbook.
    assert_eq!(system.warnings.len(), 1 + config().environmental.len());
    assert!(
        system
            .warnings
            .iter()
            .all(|warning| matches!(warning, ParseWarning::ExtensionUnavailable { .. }))
    );
}

#[test]
fn total_column_is_dropped_when_configured() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("wiot08_row_apr12.xlsx");
    let mut rows = wiot_rows();
    for (row, cell) in rows.iter_mut().zip(
        ["", "", "TOT", "Total output", "TOT", "c99", "11", "22", "33", "44", "", "", ""],
    ) {
        row.resize(12, String::new());
        row.push(cell.to_string());
    }
    common::write_workbook(&path, &[("WIOT_08", rows)]);

    let system = parse_wiod(&path, None, &WiodConfig::default()).expect("WIOD parsed");
    assert_eq!(system.y.as_ref().expect("Y present").shape(), (4, 4));
    let first = &system.meta.modifications()[0];
    assert!(first.text.starts_with("Removed total column"));
    assert!(first.text.ends_with("losing 110"));
}

#[test]
fn folder_and_year_pick_the_workbook() {
    let dir = tempdir().expect("temporary directory");
    wiot(dir.path());

    let system = WiodAdapter::new(config())
        .with_year(2008)
        .with_names(NameScheme::CCodes, NameScheme::Full)
        .parse(dir.path())
        .expect("WIOD parsed");
    assert_eq!(system.sectors(), vec!["c1", "c35"]);
    let categories = system
        .y
        .as_ref()
        .expect("Y present")
        .columns()
        .level_values(mrio_ingest::model::IndexLevel::Category);
    assert_eq!(categories, vec!["Final consumption", "Capital formation"]);

    let err = parse_wiod(dir.path(), None, &config()).unwrap_err();
    assert!(matches!(err, IngestError::InvalidParameter(_)));
}

#[test]
fn employment_accounts_are_read_from_the_sea_workbook() {
    let dir = tempdir().expect("temporary directory");
    let path = wiot(dir.path());
    let sea: &[&[&str]] = &[
        &["Country", "Variable", "Description", "Code", "_2007", "_2008"],
        &["AUS", "EMP", "Employment", "AtB", "1", "2"],
        &["AUS", "EMP", "Employment", "C", "1", "3"],
        &["AUS", "EMP", "Employment", "TOT", "2", "5"],
        &["ROU", "EMP", "Employment", "AtB", "1", "4"],
        &["ROU", "H_EMP", "Hours", "C", "1", "7"],
    ];
    common::write_workbook(
        &dir.path().join("WIOD_SEA_July14.xlsx"),
        &[("DATA", common::rows(sea))],
    );

    let system = parse_wiod(&path, None, &config()).expect("WIOD parsed");
    let sea = system.extension("SEA").expect("SEA extension");
    let f = sea.f.as_ref().expect("F present");
    assert_eq!(f.shape(), (4, 4));
    assert_eq!(f.values().row(0), &[2.0, 3.0, 4.0, 0.0]);
    assert_eq!(f.values().row(2), &[0.0, 0.0, 0.0, 7.0]);
    assert_eq!(sea.unit.units()[0], "thousand persons");
    assert!(
        system
            .meta
            .notes()
            .iter()
            .any(|note| note.text.contains("no RoW rows"))
    );
}

#[test]
fn title_without_year_is_rejected() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("wiot08_row_apr12.xlsx");
    let mut rows = wiot_rows();
    rows[0][0] = "Tableau entrée-sortie é008".to_string();
    common::write_workbook(&path, &[("WIOT_08", rows)]);

    let err = parse_wiod(&path, None, &config()).unwrap_err();
    assert!(matches!(err, IngestError::FormatDetection { .. }));
}
