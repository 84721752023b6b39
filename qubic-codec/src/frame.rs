use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use qubic_core::model::MatrixData;
use qubic_core::{QubicError, QubicResult};

use crate::checksum::rolling32;

/// Frame magic bytes.
pub const MAGIC: [u8; 4] = *b"NRDB";

/// Current frame version. Decode rejects anything newer.
pub const FRAME_VERSION: u16 = 1;

/// Flags bit 0: payload is zlib-compressed.
pub const FLAG_COMPRESSED: u16 = 0x0001;

/// Fixed header: magic(4) version(2) flags(2) index_id_len(4) data_len(8)
/// checksum(4).
pub const HEADER_LEN: usize = 24;

/// Encode a matrix into one frame. With `compress` set the payload is
/// stored compressed only when that actually shrinks it; otherwise the raw
/// form is stored and the flag cleared.
pub fn encode(data: &MatrixData, compress: bool) -> QubicResult<Vec<u8>> {
    let raw = serde_json::to_vec(data).map_err(QubicError::persist)?;

    let (payload, flags) = if compress {
        let compressed = zlib_compress(&raw)?;
        if compressed.len() <= raw.len() {
            (compressed, FLAG_COMPRESSED)
        } else {
            (raw, 0)
        }
    } else {
        (raw, 0)
    };

    let index_id = data.index_id.as_bytes();
    let checksum = rolling32(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + index_id.len() + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&(index_id.len() as u32).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(index_id);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode one frame back into a matrix. Fails with `LoadFailed` on short
/// input, wrong magic, a newer version, checksum mismatch, or a payload
/// that does not parse.
pub fn decode(bytes: &[u8]) -> QubicResult<MatrixData> {
    let header = parse_header(bytes)?;
    let id_end = HEADER_LEN + header.index_id_len;
    let index_id = std::str::from_utf8(&bytes[HEADER_LEN..id_end])
        .map_err(|_| QubicError::load("frame index_id is not valid UTF-8"))?;
    let payload = &bytes[id_end..id_end + header.data_len];

    if rolling32(payload) != header.checksum {
        return Err(QubicError::load(format!(
            "payload checksum mismatch for index {index_id}"
        )));
    }

    let raw = if header.flags & FLAG_COMPRESSED != 0 {
        zlib_decompress(payload)?
    } else {
        payload.to_vec()
    };

    let data: MatrixData = serde_json::from_slice(&raw).map_err(QubicError::load)?;
    if data.index_id != index_id {
        return Err(QubicError::load(format!(
            "frame index_id {index_id} disagrees with payload {}",
            data.index_id
        )));
    }
    Ok(data)
}

/// Read a frame's index_id without decoding the payload.
pub fn peek_index_id(bytes: &[u8]) -> QubicResult<String> {
    let header = parse_header(bytes)?;
    let id_end = HEADER_LEN + header.index_id_len;
    let index_id = std::str::from_utf8(&bytes[HEADER_LEN..id_end])
        .map_err(|_| QubicError::load("frame index_id is not valid UTF-8"))?;
    Ok(index_id.to_string())
}

struct Header {
    flags: u16,
    index_id_len: usize,
    data_len: usize,
    checksum: u32,
}

fn parse_header(bytes: &[u8]) -> QubicResult<Header> {
    if bytes.len() < HEADER_LEN {
        return Err(QubicError::load(format!(
            "frame too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0..4] != MAGIC {
        return Err(QubicError::load("bad frame magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version > FRAME_VERSION {
        return Err(QubicError::load(format!(
            "frame version {version} is newer than supported {FRAME_VERSION}"
        )));
    }
    let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
    let index_id_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let data_len = u64::from_le_bytes(bytes[12..20].try_into().unwrap()) as usize;
    let checksum = u32::from_le_bytes(bytes[20..24].try_into().unwrap());

    let expected = HEADER_LEN
        .checked_add(index_id_len)
        .and_then(|n| n.checked_add(data_len));
    match expected {
        Some(total) if bytes.len() >= total => Ok(Header {
            flags,
            index_id_len,
            data_len,
            checksum,
        }),
        _ => Err(QubicError::load("frame truncated")),
    }
}

fn zlib_compress(raw: &[u8]) -> QubicResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).map_err(QubicError::persist)?;
    encoder.finish().map_err(QubicError::persist)
}

fn zlib_decompress(payload: &[u8]) -> QubicResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(payload);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw).map_err(QubicError::load)?;
    Ok(raw)
}
