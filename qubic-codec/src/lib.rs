//! # qubic-codec
//!
//! Serializes one matrix into one self-describing frame and back.
//! Frame layout: fixed 24-byte header, raw index_id bytes, payload bytes.
//! The payload is field-tagged JSON, optionally zlib-compressed, covered
//! by a rolling 32-bit checksum.

mod checksum;
mod frame;

pub use checksum::rolling32;
pub use frame::{decode, encode, peek_index_id, FLAG_COMPRESSED, FRAME_VERSION, HEADER_LEN, MAGIC};
