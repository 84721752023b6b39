//! Frame round-trip and corruption detection tests.

use proptest::prelude::*;

use qubic_codec::{decode, encode, peek_index_id, FLAG_COMPRESSED, HEADER_LEN, MAGIC};
use qubic_core::model::{Matrix, Neuron, Synapse};
use qubic_core::QubicError;

fn sample_matrix(index_id: &str, neurons: usize) -> Matrix {
    let mut m = Matrix::new(index_id);
    let mut ids = Vec::new();
    for i in 0..neurons {
        let n = Neuron::new(format!("memory number {i}"), vec![0.1; m.current_dim]);
        ids.push(n.id.clone());
        m.insert_neuron(n).unwrap();
    }
    for pair in ids.windows(2) {
        m.insert_synapse(Synapse::new(pair[0].clone(), pair[1].clone(), 0.4))
            .unwrap();
    }
    m
}

#[test]
fn round_trip_uncompressed() {
    let data = sample_matrix("tenant-a", 5).snapshot_data();
    let frame = encode(&data, false).unwrap();
    assert_eq!(frame[0..4], MAGIC);
    assert_eq!(decode(&frame).unwrap(), data);
}

#[test]
fn round_trip_compressed() {
    let data = sample_matrix("tenant-b", 20).snapshot_data();
    let frame = encode(&data, true).unwrap();
    let flags = u16::from_le_bytes([frame[6], frame[7]]);
    assert_eq!(flags & FLAG_COMPRESSED, FLAG_COMPRESSED);
    assert_eq!(decode(&frame).unwrap(), data);
}

#[test]
fn compression_shrinks_repetitive_payloads() {
    let data = sample_matrix("tenant-c", 50).snapshot_data();
    let plain = encode(&data, false).unwrap();
    let packed = encode(&data, true).unwrap();
    assert!(packed.len() < plain.len());
}

#[test]
fn empty_matrix_round_trips() {
    let data = Matrix::new("empty").snapshot_data();
    let frame = encode(&data, true).unwrap();
    assert_eq!(decode(&frame).unwrap(), data);
}

#[test]
fn peek_reads_index_id_without_decoding() {
    let data = sample_matrix("peekable", 3).snapshot_data();
    let frame = encode(&data, true).unwrap();
    assert_eq!(peek_index_id(&frame).unwrap(), "peekable");
}

#[test]
fn short_input_fails() {
    let err = decode(&[0u8; 4]).unwrap_err();
    assert!(matches!(err, QubicError::LoadFailed { .. }));
}

#[test]
fn truncated_payload_fails() {
    let data = sample_matrix("trunc", 3).snapshot_data();
    let frame = encode(&data, false).unwrap();
    let err = decode(&frame[..frame.len() - 10]).unwrap_err();
    assert!(matches!(err, QubicError::LoadFailed { .. }));
}

#[test]
fn wrong_magic_fails() {
    let data = sample_matrix("magic", 1).snapshot_data();
    let mut frame = encode(&data, false).unwrap();
    frame[0] = b'X';
    let err = decode(&frame).unwrap_err();
    assert!(matches!(err, QubicError::LoadFailed { .. }));
}

#[test]
fn newer_version_fails() {
    let data = sample_matrix("future", 1).snapshot_data();
    let mut frame = encode(&data, false).unwrap();
    frame[4] = 0xFF;
    frame[5] = 0xFF;
    let err = decode(&frame).unwrap_err();
    assert!(matches!(err, QubicError::LoadFailed { .. }));
}

proptest! {
    // Any single bit flip in the payload region must surface as a checksum
    // or decoder failure, never as a silently different matrix.
    #[test]
    fn payload_bit_flip_never_passes(bit in 0usize..64, compress in proptest::bool::ANY) {
        let data = sample_matrix("flip", 4).snapshot_data();
        let frame = encode(&data, compress).unwrap();
        let payload_start = HEADER_LEN + "flip".len();
        let payload_bits = (frame.len() - payload_start) * 8;
        let bit = bit % payload_bits;
        let mut corrupted = frame.clone();
        corrupted[payload_start + bit / 8] ^= 1 << (bit % 8);

        match decode(&corrupted) {
            Err(QubicError::LoadFailed { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error kind: {other}"),
            Ok(decoded) => prop_assert!(false, "corrupt frame decoded: {}", decoded.index_id),
        }
    }
}
