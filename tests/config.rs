use mrio_ingest::IngestError;
use mrio_ingest::adapters::{SourceKind, adapter_for};
use mrio_ingest::config::{IngestConfig, OecdConfig, TransformConfig};
use mrio_ingest::provenance::{MetaField, ProvenanceLog};
use tempfile::tempdir;

#[test]
fn partial_override_keeps_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ingest.json");
    std::fs::write(
        &path,
        r#"{
            "sniff": { "sample_lines": 5 },
            "oecd": { "monetary_unit": "Million EUR" }
        }"#,
    )
    .unwrap();

    let config = IngestConfig::from_json_file(&path).unwrap();
    assert_eq!(config.sniff.sample_lines, 5);
    assert_eq!(config.sniff.separators, vec!['\t', ',', ';']);
    assert_eq!(config.oecd.monetary_unit, "Million EUR");
    assert_eq!(config.oecd.total_rows, OecdConfig::default().total_rows);
    assert_eq!(config.transform, TransformConfig::default());
    assert_eq!(config.wiod.last_interindustry_code, "c35");
}

#[test]
fn malformed_json_is_reported() {
    let err = IngestConfig::from_json_str("{ \"sniff\": ").unwrap_err();
    assert!(matches!(err, IngestError::Json(_)));

    let missing = IngestConfig::from_json_file(std::path::Path::new("/nonexistent/ingest.json"));
    assert!(matches!(missing, Err(IngestError::Io(_))));
}

#[test]
fn every_source_has_a_default_adapter() {
    let config = IngestConfig::default();
    for kind in SourceKind::ALL {
        let adapter = adapter_for(kind, &config).unwrap();
        assert_eq!(adapter.kind(), kind);
    }
}

#[test]
fn invalid_pattern_fails_adapter_construction() {
    let mut config = IngestConfig::default();
    config.oecd.factor_input_pattern = "VALU(".into();
    let err = adapter_for(SourceKind::Oecd, &config).err().unwrap();
    assert!(matches!(err, IngestError::Pattern(_)));
}

#[test]
fn metadata_changes_are_noted() {
    let mut log = ProvenanceLog::new("OECD-ICIO");
    log.change_meta(MetaField::Year, "2011");
    log.change_meta(MetaField::Year, "2015");

    let notes: Vec<_> = log.notes().iter().map(|entry| entry.text.clone()).collect();
    assert_eq!(
        notes,
        vec![
            "Set parameter \"year\" to \"2011\"".to_string(),
            "Changed parameter \"year\" from \"2011\" to \"2015\"".to_string(),
        ]
    );

    let rendered = log.to_string();
    assert!(rendered.contains("MRIO Name: OECD-ICIO"));
    assert!(rendered.contains("Year: 2015"));
    assert!(rendered.contains("NOTE: Set parameter"));
}
