//! Reader for dense numeric arrays stored as `.npy` members of an `.npz`
//! (zip) container.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use regex::Regex;
use zip::ZipArchive;

use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::model::Matrix;

const MAGIC: &[u8] = b"\x93NUMPY";

/// N-dimensional `f64` array in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(IngestError::structure(
                "array",
                format!("{} values for shape {shape:?}", data.len()),
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn into_matrix(self, name: &str) -> Result<Matrix> {
        match self.shape.as_slice() {
            [rows, cols] => Matrix::new(*rows, *cols, self.data),
            shape => Err(IngestError::structure(
                name,
                format!("expected a 2-d array, found shape {shape:?}"),
            )),
        }
    }

    /// 2-d slice `[:, :, index]` of a 3-d array.
    pub fn slice_last(&self, name: &str, index: usize) -> Result<Matrix> {
        let [rows, cols, depth] = self.shape.as_slice() else {
            return Err(IngestError::structure(
                name,
                format!("expected a 3-d array, found shape {:?}", self.shape),
            ));
        };
        if index >= *depth {
            return Err(IngestError::structure(
                name,
                format!("slice {index} out of range for depth {depth}"),
            ));
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..*rows {
            for c in 0..*cols {
                data.push(self.data[(r * cols + c) * depth + index]);
            }
        }
        Matrix::new(*rows, *cols, data)
    }
}

/// Parses one `.npy` payload (format versions 1 to 3).
pub fn read_npy(name: &str, bytes: &[u8]) -> Result<NdArray> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(IngestError::format(name, "missing NPY magic"));
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        other => {
            return Err(IngestError::format(
                name,
                format!("unsupported NPY version {other}"),
            ));
        }
    };
    let header_end = header_start + header_len;
    let header = bytes
        .get(header_start..header_end)
        .map(String::from_utf8_lossy)
        .ok_or_else(|| IngestError::format(name, "truncated NPY header"))?;

    let descr = header_field(&header, r"'descr':\s*'([^']+)'")
        .ok_or_else(|| IngestError::format(name, "NPY header without descr"))?;
    let fortran = header_field(&header, r"'fortran_order':\s*(True|False)")
        .is_some_and(|value| value == "True");
    let shape_text = header_field(&header, r"'shape':\s*\(([^)]*)\)")
        .ok_or_else(|| IngestError::format(name, "NPY header without shape"))?;
    let shape = shape_text
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|_| IngestError::format(name, format!("bad dimension '{part}'")))
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = &bytes[header_end.min(bytes.len())..];
    let values = decode(name, &descr, payload)?;
    let count: usize = shape.iter().product();
    if values.len() < count {
        return Err(IngestError::format(
            name,
            format!("{} values for shape {shape:?}", values.len()),
        ));
    }
    let mut values = values;
    values.truncate(count);
    if fortran && shape.len() > 1 {
        values = fortran_to_c(&shape, &values);
    }
    NdArray::new(shape, values)
}

/// Reads every `.npy` member of an `.npz` container, keyed by member name
/// without the extension.
pub fn read_npz(bytes: Vec<u8>) -> Result<BTreeMap<String, NdArray>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut arrays = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(key) = entry.name().strip_suffix(".npy").map(str::to_string) else {
            continue;
        };
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        arrays.insert(key.clone(), read_npy(&key, &buf)?);
    }
    Ok(arrays)
}

fn header_field(header: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    re.captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn decode(name: &str, descr: &str, payload: &[u8]) -> Result<Vec<f64>> {
    let little = !descr.starts_with('>');
    let kind = descr.trim_start_matches(['<', '>', '|', '=']);

    fn chunks<const N: usize>(payload: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
        payload.chunks_exact(N).map(|chunk| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(chunk);
            buf
        })
    }

    let values = match kind {
        "f8" => chunks::<8>(payload)
            .map(|b| if little { f64::from_le_bytes(b) } else { f64::from_be_bytes(b) })
            .collect(),
        "f4" => chunks::<4>(payload)
            .map(|b| f64::from(if little { f32::from_le_bytes(b) } else { f32::from_be_bytes(b) }))
            .collect(),
        "i8" => chunks::<8>(payload)
            .map(|b| (if little { i64::from_le_bytes(b) } else { i64::from_be_bytes(b) }) as f64)
            .collect(),
        "i4" => chunks::<4>(payload)
            .map(|b| f64::from(if little { i32::from_le_bytes(b) } else { i32::from_be_bytes(b) }))
            .collect(),
        other => {
            return Err(IngestError::format(
                name,
                format!("unsupported array dtype '{other}'"),
            ));
        }
    };
    Ok(values)
}

fn fortran_to_c(shape: &[usize], values: &[f64]) -> Vec<f64> {
    let count = values.len();
    let mut out = vec![0.0; count];
    let mut index = vec![0usize; shape.len()];
    for value in values {
        // Fortran order: first axis varies fastest.
        let mut c_pos = 0;
        for (axis, dim) in shape.iter().enumerate() {
            c_pos = c_pos * dim + index[axis];
        }
        out[c_pos] = *value;
        for (axis, dim) in shape.iter().enumerate() {
            index[axis] += 1;
            if index[axis] < *dim {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}

/// Encodes a little-endian `f8` array, for fixtures.
pub fn write_npy(shape: &[usize], data: &[f64]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
    let shape_text = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let mut header =
        format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape_text}, }}");
    while (MAGIC.len() + 4 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + data.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for value in data {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npy_payload_parses_shape_and_values() {
        let bytes = write_npy(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let array = read_npy("A", &bytes).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        let matrix = array.into_matrix("A").unwrap();
        assert_eq!(matrix.get(1, 0), 4.0);
    }

    #[test]
    fn last_axis_slice_of_cube() {
        let data: Vec<f64> = (0..12).map(f64::from).collect();
        let array = NdArray::new(vec![2, 2, 3], data).unwrap();
        let slice = array.slice_last("S_f", 2).unwrap();
        assert_eq!(slice.data(), &[2.0, 5.0, 8.0, 11.0]);
        assert!(array.slice_last("S_f", 3).is_err());
    }

    #[test]
    fn fortran_layout_is_reordered() {
        let c = fortran_to_c(&[2, 3], &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(c, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
