//! In-place rewrite of the EXIF capture timestamps of a JPEG file.
//!
//! The Exif APP1 segment is decoded with `kamadak-exif`, the two datetime
//! fields are replaced, the TIFF block is re-encoded and spliced back into
//! the file. Everything outside that one segment, including the entropy
//! coded image data, is copied through byte for byte.

use std::fs;
use std::io::Cursor;
use std::ops::Range;
use std::path::{Path, PathBuf};

use exif::experimental::Writer;
use exif::{Context, Field, In, Reader, Tag, Value};

use crate::error::FixError;

const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOS: u8 = 0xDA;
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const EXIF_HEADER: &[u8] = b"Exif\0\0";
/// Segment length field is 16 bits and counts itself.
const MAX_SEGMENT_PAYLOAD: usize = 0xFFFF - 2;

/// Tags the writer derives itself; pushing them is an error.
const POINTER_TAGS: &[Tag] = &[
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
];
/// TileOffsets, TileByteCounts
const TILE_TAG_NUMBERS: &[u16] = &[0x0144, 0x0145];

/// Where the Exif segment is, or where a new one goes.
struct JpegLayout {
    /// Whole APP1 segment including marker and length
    exif_segment: Option<Range<usize>>,
    insert_at: usize,
}

/// Decoded EXIF ready to be re-encoded.
struct ExifFields {
    fields: Vec<Field>,
    thumbnail: Option<Vec<u8>>,
    little_endian: bool,
}

/// Set `DateTimeOriginal` and `DateTimeDigitized` to `stamp`
/// (`YYYY:MM:DD HH:MM:SS`) and rewrite the file.
pub fn write_capture_time(path: &Path, stamp: &str) -> Result<(), FixError> {
    let data = fs::read(path).map_err(|e| load_error(path, e.to_string()))?;
    let layout = scan_segments(&data).map_err(|reason| load_error(path, reason))?;

    let mut exif = match &layout.exif_segment {
        Some(seg) => {
            let tiff = data[seg.start + 4 + EXIF_HEADER.len()..seg.end].to_vec();
            decode_fields(tiff).map_err(|reason| load_error(path, reason))?
        }
        None => {
            log::warn!(
                "No EXIF data in JPEG {}. Creating new EXIF structure.",
                path.display()
            );
            ExifFields {
                fields: Vec::new(),
                thumbnail: None,
                little_endian: false,
            }
        }
    };

    set_datetime(&mut exif.fields, Tag::DateTimeOriginal, stamp);
    set_datetime(&mut exif.fields, Tag::DateTimeDigitized, stamp);

    let segment = encode_segment(&exif).map_err(|reason| FixError::MetadataEncodeFailure {
        path: path.to_path_buf(),
        reason,
    })?;

    let replaced = layout
        .exif_segment
        .unwrap_or(layout.insert_at..layout.insert_at);
    let mut out = Vec::with_capacity(data.len() + segment.len());
    out.extend_from_slice(&data[..replaced.start]);
    out.extend_from_slice(&segment);
    out.extend_from_slice(&data[replaced.end..]);

    replace_file(path, &out).map_err(|source| FixError::MetadataWriteFailure {
        path: path.to_path_buf(),
        source,
    })
}

fn load_error(path: &Path, reason: String) -> FixError {
    FixError::MetadataLoadFailure {
        path: path.to_path_buf(),
        reason,
    }
}

/// Walk marker segments up to the start of scan.
fn scan_segments(data: &[u8]) -> Result<JpegLayout, String> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != MARKER_SOI {
        return Err("not a JPEG file".to_string());
    }

    let mut layout = JpegLayout {
        exif_segment: None,
        insert_at: 2,
    };
    let mut pos = 2usize;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return Err(format!("expected marker at offset {}", pos));
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        if marker == MARKER_SOS || marker == MARKER_EOI {
            break;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }

        let seg_len = ((data[pos + 2] as usize) << 8) | (data[pos + 3] as usize);
        let seg_end = pos + 2 + seg_len;
        if seg_len < 2 || seg_end > data.len() {
            return Err(format!("truncated segment 0x{:02X} at offset {}", marker, pos));
        }

        if marker == MARKER_APP0 && pos == 2 {
            // keep JFIF first
            layout.insert_at = seg_end;
        }
        if marker == MARKER_APP1
            && layout.exif_segment.is_none()
            && data[pos + 4..seg_end].starts_with(EXIF_HEADER)
        {
            layout.exif_segment = Some(pos..seg_end);
        }

        pos = seg_end;
    }
    Ok(layout)
}

fn decode_fields(tiff: Vec<u8>) -> Result<ExifFields, String> {
    let exif = Reader::new().read_raw(tiff).map_err(|e| e.to_string())?;

    let thumbnail = thumbnail_bytes(&exif);
    let fields = exif
        .fields()
        .filter(|f| !POINTER_TAGS.contains(&f.tag))
        .filter(|f| !(f.tag.context() == Context::Tiff && TILE_TAG_NUMBERS.contains(&f.tag.number())))
        .filter(|f| !matches!(f.value, Value::Unknown(..)))
        .map(|f| Field {
            tag: f.tag,
            ifd_num: f.ifd_num,
            value: f.value.clone(),
        })
        .collect();

    Ok(ExifFields {
        fields,
        thumbnail,
        little_endian: exif.little_endian(),
    })
}

fn thumbnail_bytes(exif: &exif::Exif) -> Option<Vec<u8>> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf().get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
}

fn set_datetime(fields: &mut Vec<Field>, tag: Tag, stamp: &str) {
    fields.retain(|f| f.tag != tag);
    fields.push(Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![stamp.as_bytes().to_vec()]),
    });
}

/// Complete APP1 segment: marker, length, `Exif\0\0`, TIFF block.
fn encode_segment(exif: &ExifFields) -> Result<Vec<u8>, String> {
    let mut writer = Writer::new();
    for field in &exif.fields {
        writer.push_field(field);
    }
    if let Some(thumb) = &exif.thumbnail {
        writer.set_jpeg(thumb, In::THUMBNAIL);
    }

    let mut tiff = Cursor::new(Vec::new());
    writer
        .write(&mut tiff, exif.little_endian)
        .map_err(|e| e.to_string())?;
    let tiff = tiff.into_inner();

    let payload_len = EXIF_HEADER.len() + tiff.len();
    if payload_len > MAX_SEGMENT_PAYLOAD {
        return Err(format!("EXIF block of {} bytes does not fit in APP1", payload_len));
    }

    let mut segment = Vec::with_capacity(payload_len + 4);
    segment.extend_from_slice(&[0xFF, MARKER_APP1]);
    segment.extend_from_slice(&((payload_len + 2) as u16).to_be_bytes());
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(&tiff);
    Ok(segment)
}

/// Write next to the target, then rename over it.
fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp = temp_path_for(path);
    let result = fs::write(&temp, bytes)
        .and_then(|_| fs::metadata(path))
        .and_then(|meta| fs::set_permissions(&temp, meta.permissions()))
        .and_then(|_| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".timefix-{}.tmp", std::process::id()));
    path.with_file_name(name)
}
