//! Binary little-endian PLY point clouds.
//!
//! Records keep their raw bytes so subsets can be re-encoded byte for byte;
//! only `float` properties are decoded into typed fields.

use crate::config::RigConfig;
use crate::error::{Result, RigError};
use crate::progress::{NoProgress, PassProgress, ProgressSink};
use std::io::Read;

const HEADER_ENDS: [&[u8]; 2] = [b"end_header\n", b"end_header\r\n"];
const READ_CHUNK: usize = 64 * 1024;

/// Scalar property types and their on-disk sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl PropertyType {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::Char,
            "uchar" | "uint8" => Self::UChar,
            "short" | "int16" => Self::Short,
            "ushort" | "uint16" => Self::UShort,
            "int" | "int32" => Self::Int,
            "uint" | "uint32" => Self::UInt,
            "float" | "float32" => Self::Float,
            "double" | "float64" => Self::Double,
            _ => return None,
        })
    }

    pub const fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub ty: PropertyType,
    /// Byte offset inside a record
    pub offset: usize,
}

/// Ordered property list of the vertex element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordLayout {
    properties: Vec<Property>,
    record_size: usize,
    /// Slot of each property in the float table, for float properties
    float_slots: Vec<Option<usize>>,
    float_count: usize,
}

impl RecordLayout {
    pub fn new(declared: Vec<(PropertyType, String)>) -> Self {
        let mut layout = Self::default();
        for (ty, name) in declared {
            let slot = (ty == PropertyType::Float).then(|| {
                layout.float_count += 1;
                layout.float_count - 1
            });
            layout.properties.push(Property {
                name,
                ty,
                offset: layout.record_size,
            });
            layout.float_slots.push(slot);
            layout.record_size += ty.size();
        }
        layout
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    #[inline]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Float-table slot for a float property
    pub fn float_slot(&self, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.name == name)
            .and_then(|i| self.float_slots[i])
    }
}

/// Borrowed view of one vertex record.
#[derive(Debug, Clone, Copy)]
pub struct PlyRecord<'a> {
    pub raw: &'a [u8],
    floats: &'a [f32],
    layout: &'a RecordLayout,
}

impl<'a> PlyRecord<'a> {
    /// Typed value of a float property, `None` for unknown or non-float names
    pub fn float(&self, name: &str) -> Option<f32> {
        self.layout.float_slot(name).map(|slot| self.floats[slot])
    }
}

/// A decoded point cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct PlyData {
    /// Non-empty header lines, `ply` through `end_header`
    pub header: Vec<String>,
    pub layout: RecordLayout,
    vertex_count: usize,
    /// `vertex_count * record_size` raw record bytes
    data: Vec<u8>,
    /// `vertex_count * float_count` decoded float fields
    floats: Vec<f32>,
    /// Header lines were terminated by `\r\n`
    crlf: bool,
}

impl PlyData {
    /// Decode an in-memory buffer without progress output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes, Some(bytes.len()), &RigConfig::default(), &mut NoProgress)
    }

    /// Decode from a (possibly non-seekable) stream.
    ///
    /// Progress pass 1/2 follows bytes read against `total_len` when it is
    /// known; pass 2/2 follows records parsed.
    pub fn decode<R: Read>(
        mut reader: R,
        total_len: Option<usize>,
        config: &RigConfig,
        sink: &mut dyn ProgressSink,
    ) -> Result<Self> {
        let mut bytes = Vec::with_capacity(total_len.unwrap_or(0));
        {
            let mut progress = PassProgress::new(sink, 1, 2, config.progress_bytes);
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                let n = reader.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                let previous = bytes.len();
                bytes.extend_from_slice(&chunk[..n]);
                if let Some(total) = total_len {
                    progress.advance(previous, bytes.len(), total);
                }
            }
            progress.finish();
        }

        let header_len = header_len(&bytes).ok_or(RigError::MissingHeaderEnd)?;
        let crlf = bytes[..header_len].ends_with(b"\r\n");
        let header_text = std::str::from_utf8(&bytes[..header_len])
            .map_err(|e| RigError::PlyParse(format!("header is not valid UTF-8: {}", e)))?;
        let (header, layout, vertex_count) = parse_header(header_text)?;

        let record_size = layout.record_size();
        if record_size == 0 && vertex_count > 0 {
            return Err(RigError::PlyParse("vertex element declares no properties".into()));
        }
        let expected = vertex_count.checked_mul(record_size).ok_or_else(|| {
            RigError::PlyParse(format!(
                "vertex count {} overflows record size {}",
                vertex_count, record_size
            ))
        })?;
        let body = &bytes[header_len..];
        if body.len() < expected {
            return Err(RigError::Truncated {
                expected,
                found: body.len(),
            });
        }
        let data = body[..expected].to_vec();

        let floats = {
            let mut progress = PassProgress::new(sink, 2, 2, config.progress_records);
            let mut floats = Vec::with_capacity(vertex_count * layout.float_count);
            for (i, raw) in data.chunks_exact(layout.record_size().max(1)).take(vertex_count).enumerate() {
                for p in layout.properties.iter().filter(|p| p.ty == PropertyType::Float) {
                    let b = &raw[p.offset..p.offset + 4];
                    floats.push(f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                }
                progress.tick(i, vertex_count);
            }
            progress.finish();
            floats
        };

        log::info!(
            "Decoded PLY: {} vertices, {} properties, {} bytes per record",
            vertex_count,
            layout.properties.len(),
            layout.record_size()
        );

        Ok(Self {
            header,
            layout,
            vertex_count,
            data,
            floats,
            crlf,
        })
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    #[inline]
    pub fn record_size(&self) -> usize {
        self.layout.record_size()
    }

    pub fn record(&self, index: usize) -> PlyRecord<'_> {
        let size = self.layout.record_size();
        let fc = self.layout.float_count;
        PlyRecord {
            raw: &self.data[index * size..(index + 1) * size],
            floats: &self.floats[index * fc..(index + 1) * fc],
            layout: &self.layout,
        }
    }

    pub fn records(&self) -> impl Iterator<Item = PlyRecord<'_>> + '_ {
        (0..self.vertex_count).map(move |i| self.record(i))
    }

    /// Whole column of a float property
    pub fn float_column(&self, name: &str) -> Option<Vec<f32>> {
        let slot = self.layout.float_slot(name)?;
        let fc = self.layout.float_count;
        Some(self.floats.iter().skip(slot).step_by(fc).copied().collect())
    }

    /// Encode every record
    pub fn encode(&self) -> Vec<u8> {
        let mut out = header_bytes(&self.header, self.vertex_count, self.crlf);
        out.extend_from_slice(&self.data);
        out
    }

    /// Encode the records at `indices`, in that order, with the vertex count
    /// rewritten. Raw bytes are copied, never re-derived from typed fields.
    pub fn encode_subset(&self, indices: &[usize]) -> Vec<u8> {
        let mut out = header_bytes(&self.header, indices.len(), self.crlf);
        out.reserve(indices.len() * self.record_size());
        for &i in indices {
            out.extend_from_slice(self.record(i).raw);
        }
        out
    }

    /// In-memory equivalent of decoding `encode_subset(indices)`
    pub fn subset(&self, indices: &[usize]) -> Self {
        let fc = self.layout.float_count;
        let mut data = Vec::with_capacity(indices.len() * self.record_size());
        let mut floats = Vec::with_capacity(indices.len() * fc);
        for &i in indices {
            let record = self.record(i);
            data.extend_from_slice(record.raw);
            floats.extend_from_slice(record.floats);
        }
        Self {
            header: rewrite_vertex_count(&self.header, indices.len()),
            layout: self.layout.clone(),
            vertex_count: indices.len(),
            data,
            floats,
            crlf: self.crlf,
        }
    }
}

/// Replace the `element vertex N` line
pub fn rewrite_vertex_count(header: &[String], count: usize) -> Vec<String> {
    header
        .iter()
        .map(|line| {
            if line.starts_with("element vertex") {
                format!("element vertex {}", count)
            } else {
                line.clone()
            }
        })
        .collect()
}

fn header_bytes(header: &[String], count: usize, crlf: bool) -> Vec<u8> {
    let newline = if crlf { "\r\n" } else { "\n" };
    let mut text = rewrite_vertex_count(header, count).join(newline);
    text.push_str(newline);
    text.into_bytes()
}

/// Byte length of the header through its `end_header` line
fn header_len(bytes: &[u8]) -> Option<usize> {
    HEADER_ENDS
        .iter()
        .filter_map(|end| {
            bytes
                .windows(end.len())
                .position(|w| w == *end)
                .map(|p| p + end.len())
        })
        .min()
}

fn parse_header(text: &str) -> Result<(Vec<String>, RecordLayout, usize)> {
    let header: Vec<String> = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    if header.first().map(|l| l.trim()) != Some("ply") {
        return Err(RigError::PlyParse("missing 'ply' magic line".into()));
    }

    let mut vertex_count = None;
    let mut declared = Vec::new();
    // Element the following property lines belong to, with its count
    let mut current: Option<(String, usize)> = None;

    for line in &header[1..] {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["format", format, ..] => {
                if *format != "binary_little_endian" {
                    return Err(RigError::Unsupported(format!("format {}", format)));
                }
            }
            ["element", name, count] => {
                let count: usize = count
                    .parse()
                    .map_err(|_| RigError::PlyParse(format!("bad element count in '{}'", line)))?;
                if *name == "vertex" {
                    vertex_count = Some(count);
                }
                current = Some((name.to_string(), count));
            }
            ["property", "list", ..] => match &current {
                Some((name, count)) if name != "vertex" && *count == 0 => {}
                _ => return Err(RigError::Unsupported(format!("list property '{}'", line))),
            },
            ["property", ty, name] => match &current {
                Some((element, _)) if element == "vertex" => {
                    let ty = PropertyType::parse(ty)
                        .ok_or_else(|| RigError::Unsupported(format!("property type '{}'", ty)))?;
                    declared.push((ty, name.to_string()));
                }
                Some((element, count)) if *count > 0 => {
                    return Err(RigError::Unsupported(format!("populated element '{}'", element)))
                }
                Some(_) => {}
                None => return Err(RigError::PlyParse(format!("property before element: '{}'", line))),
            },
            ["comment", ..] | ["obj_info", ..] | ["end_header"] => {}
            _ => return Err(RigError::PlyParse(format!("unrecognised header line '{}'", line))),
        }
    }

    let vertex_count =
        vertex_count.ok_or_else(|| RigError::PlyParse("no 'element vertex' line".into()))?;
    Ok((header, RecordLayout::new(declared), vertex_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::encode_float_columns;
    use crate::progress::ProgressUpdate;

    fn sample_bytes() -> Vec<u8> {
        let mut out = b"ply\nformat binary_little_endian 1.0\ncomment test\nelement vertex 3\n\
property float x\nproperty float y\nproperty uchar tag\nproperty float z\nend_header\n"
            .to_vec();
        for i in 0..3u8 {
            let f = i as f32;
            out.extend_from_slice(&f.to_le_bytes());
            out.extend_from_slice(&(f * 2.0).to_le_bytes());
            out.push(10 + i);
            out.extend_from_slice(&(-f).to_le_bytes());
        }
        out
    }

    #[test]
    fn test_decode_layout_and_fields() {
        let ply = PlyData::from_bytes(&sample_bytes()).unwrap();
        assert_eq!(ply.vertex_count(), 3);
        assert_eq!(ply.record_size(), 13);
        assert_eq!(ply.layout.property("z").unwrap().offset, 9);

        let r = ply.record(2);
        assert_eq!(r.float("x"), Some(2.0));
        assert_eq!(r.float("y"), Some(4.0));
        assert_eq!(r.float("z"), Some(-2.0));
        assert_eq!(r.float("tag"), None, "Non-float properties stay raw");
        assert_eq!(r.raw[8], 12);
        assert_eq!(ply.float_column("y").unwrap(), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_encode_is_byte_exact() {
        let bytes = sample_bytes();
        let ply = PlyData::from_bytes(&bytes).unwrap();
        assert_eq!(ply.encode(), bytes);

        let again = PlyData::from_bytes(&ply.encode()).unwrap();
        assert_eq!(again, ply);
    }

    #[test]
    fn test_subset_rewrites_count() {
        let ply = PlyData::from_bytes(&sample_bytes()).unwrap();
        let encoded = ply.encode_subset(&[2, 0]);
        let sub = PlyData::from_bytes(&encoded).unwrap();

        assert_eq!(sub.vertex_count(), 2);
        assert!(sub.header.iter().any(|l| l == "element vertex 2"));
        assert_eq!(sub.record(0).raw, ply.record(2).raw);
        assert_eq!(sub.record(1).raw, ply.record(0).raw);
        assert_eq!(sub, ply.subset(&[2, 0]));
    }

    #[test]
    fn test_missing_header_end_is_fatal() {
        let err = PlyData::from_bytes(b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n").unwrap_err();
        assert!(matches!(err, RigError::MissingHeaderEnd));
    }

    #[test]
    fn test_truncated_body() {
        let mut bytes = sample_bytes();
        bytes.truncate(bytes.len() - 5);
        let err = PlyData::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, RigError::Truncated { expected: 39, found: 34 }));
    }

    #[test]
    fn test_huge_vertex_count_is_an_error() {
        let header = |count: usize| {
            let mut bytes = format!(
                "ply\nformat binary_little_endian 1.0\nelement vertex {}\n\
property float x\nproperty float y\nproperty float z\nend_header\n",
                count
            )
            .into_bytes();
            bytes.extend_from_slice(&[0u8; 24]);
            bytes
        };

        let err = PlyData::from_bytes(&header(usize::MAX / 12 + 2)).unwrap_err();
        assert!(matches!(err, RigError::PlyParse(_)), "Overflowing count should not panic, got {:?}", err);

        let err = PlyData::from_bytes(&header(usize::MAX / 12)).unwrap_err();
        assert!(matches!(err, RigError::Truncated { found: 24, .. }));
    }

    #[test]
    fn test_vertices_without_properties_rejected() {
        let err = PlyData::from_bytes(b"ply\nformat binary_little_endian 1.0\nelement vertex 5\nend_header\n").unwrap_err();
        assert!(matches!(err, RigError::PlyParse(_)));
    }

    #[test]
    fn test_crlf_header() {
        let lf = sample_bytes();
        let split = lf.windows(11).position(|w| w == b"end_header\n").unwrap() + 11;
        let header = std::str::from_utf8(&lf[..split]).unwrap().replace('\n', "\r\n");
        let mut crlf = header.into_bytes();
        crlf.extend_from_slice(&lf[split..]);

        let ply = PlyData::from_bytes(&crlf).unwrap();
        assert_eq!(ply.vertex_count(), 3);
        assert_eq!(ply.record(1).float("y"), Some(2.0));
        assert!(ply.header.iter().all(|l| !l.ends_with('\r')));
        assert_eq!(ply.encode(), crlf, "Line endings survive re-encoding");
    }

    #[test]
    fn test_ascii_format_unsupported() {
        let err = PlyData::from_bytes(b"ply\nformat ascii 1.0\nelement vertex 0\nend_header\n").unwrap_err();
        assert!(matches!(err, RigError::Unsupported(_)));
    }

    #[test]
    fn test_stream_progress_is_monotonic() {
        let rows: Vec<Vec<f32>> = (0..25_000).map(|i| vec![i as f32, 0.0, 0.0]).collect();
        let bytes = encode_float_columns(&["x", "y", "z"], &rows);
        let config = RigConfig {
            progress_bytes: 64 * 1024,
            ..RigConfig::default()
        };

        let mut seen: Vec<ProgressUpdate> = Vec::new();
        let mut sink = |u: &ProgressUpdate| seen.push(*u);
        let ply = PlyData::decode(&bytes[..], Some(bytes.len()), &config, &mut sink).unwrap();
        assert_eq!(ply.vertex_count(), 25_000);

        let first: Vec<f32> = seen.iter().filter(|u| u.pass == 1).map(|u| u.percent).collect();
        let second: Vec<f32> = seen.iter().filter(|u| u.pass == 2).map(|u| u.percent).collect();
        assert!(first.windows(2).all(|w| w[0] <= w[1]));
        assert!(second.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(second.len(), 4, "Records report at 0, 10000, 20000 and 100%");
        assert_eq!(first.last(), Some(&100.0));
    }
}
