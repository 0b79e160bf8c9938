#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;

use rust_xlsxwriter::Workbook;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Writes `contents` to `root/relative`, creating parent folders.
pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("fixture folder created");
    }
    fs::write(path, contents).expect("fixture written");
}

/// Tab separated text from rows of cells.
pub fn tsv(rows: &[&[&str]]) -> String {
    rows.iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

/// Writes a workbook; cells that parse as numbers are stored as numbers,
/// empty cells are skipped.
pub fn write_workbook(path: &Path, sheets: &[(&str, Vec<Vec<String>>)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("workbook folder created");
    }
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).expect("sheet named");
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                match cell.parse::<f64>() {
                    Ok(number) => {
                        worksheet
                            .write_number(row_idx as u32, col_idx as u16, number)
                            .expect("number written");
                    }
                    Err(_) => {
                        worksheet
                            .write_string(row_idx as u32, col_idx as u16, cell)
                            .expect("string written");
                    }
                }
            }
        }
    }
    workbook.save(path).expect("workbook saved");
}

pub fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

/// Zip archive with stored (uncompressed) members.
pub fn zip_bytes(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in members {
            zip.start_file(*name, options).expect("zip member started");
            zip.write_all(bytes).expect("zip member written");
        }
        zip.finish().expect("zip finished");
    }
    buf
}

pub fn approx_eq(left: &[f64], right: &[f64]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(a, b)| (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs())))
}
