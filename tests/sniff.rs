mod common;

use mrio_ingest::config::SniffConfig;
use mrio_ingest::io::Repository;
use mrio_ingest::sniff::{LayoutFormat, sniff_csv_format, sniff_member};
use tempfile::tempdir;

/// Matrix text with `header_rows` label rows, `index_cols` label columns
/// and a 3 × 4 block of numbers.
fn render(separator: char, header_rows: usize, index_cols: usize) -> String {
    let sep = separator.to_string();
    let mut lines = Vec::new();
    for h in 0..header_rows {
        let mut cells: Vec<String> = (0..index_cols).map(|c| format!("level{h}_{c}")).collect();
        cells.extend((0..4).map(|c| format!("col{h}x{c}")));
        lines.push(cells.join(&sep));
    }
    for r in 0..3 {
        let mut cells: Vec<String> = (0..index_cols).map(|c| format!("row{r}label{c}")).collect();
        cells.extend((0..4).map(|c| format!("{}.5", r * 4 + c)));
        lines.push(cells.join(&sep));
    }
    lines.join("\n") + "\n"
}

#[test]
fn sniffed_layout_matches_rendered_layout() {
    let config = SniffConfig::default();
    for separator in ['\t', ','] {
        for header_rows in 1..=3 {
            for index_cols in 1..=3 {
                let text = render(separator, header_rows, index_cols);
                let format = sniff_csv_format("generated", text.as_bytes(), &config)
                    .expect("layout detected");
                assert_eq!(
                    format,
                    LayoutFormat {
                        separator,
                        header_rows,
                        index_cols,
                    },
                    "separator {separator:?}, {header_rows} header rows, {index_cols} index columns"
                );
            }
        }
    }
}

#[test]
fn archived_and_extracted_members_sniff_alike() {
    let dir = tempdir().expect("temporary directory");
    let text = render(';', 2, 2);
    common::write_file(dir.path(), "release/data/mrIot.txt", &text);
    let archive = dir.path().join("packed.zip");
    std::fs::write(
        &archive,
        common::zip_bytes(&[("data/mrIot.txt", text.clone().into_bytes())]),
    )
    .expect("archive written");

    let config = SniffConfig::default();
    let folder = Repository::open(&dir.path().join("release")).expect("folder opened");
    let zipped = Repository::open(&archive).expect("archive opened");
    assert!(zipped.is_archive());
    let from_folder = sniff_member(&folder, "data/mrIot.txt", &config).expect("folder sniffed");
    let from_zip = sniff_member(&zipped, "data/mrIot.txt", &config).expect("archive sniffed");
    assert_eq!(from_folder, from_zip);
    assert_eq!(from_zip.separator, ';');
}

#[test]
fn empty_values_and_code_labels_keep_the_label_width() {
    let text = "\
region\tsector\tAT\tAT\tDE
\t\tfood\tsteel\tfood
AT\tfood\t\t3\t1
AT\tsteel\t1\t2\t0
DE\t01\t4\t5\t6
DE\tsteel\t7\t8\t9
";
    let format =
        sniff_csv_format("gaps", text.as_bytes(), &SniffConfig::default()).expect("layout detected");
    assert_eq!(
        format,
        LayoutFormat {
            separator: '\t',
            header_rows: 2,
            index_cols: 2,
        }
    );
}
