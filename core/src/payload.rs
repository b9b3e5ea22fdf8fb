//! Synthetic payload generation
//!
//! Closed-loop requests carry random bytes. Open-loop messages carry an
//! 8-byte big-endian sequence number followed by random filler, so consumers
//! can detect malformed and duplicate deliveries.

use rand::Rng;

/// Number of header bytes holding the sequence number
pub const SEQUENCE_HEADER_LEN: usize = 8;

/// Random payload of exactly `size` bytes
pub fn random_payload(size: usize) -> Vec<u8> {
    let mut payload = vec![0u8; size];
    rand::rng().fill(&mut payload[..]);
    payload
}

/// Payload of `size` bytes whose header carries `sequence`
///
/// Payloads shorter than the header are widened to fit it.
pub fn sequenced_payload(sequence: u64, size: usize) -> Vec<u8> {
    let mut payload = random_payload(size.max(SEQUENCE_HEADER_LEN));
    payload[..SEQUENCE_HEADER_LEN].copy_from_slice(&sequence.to_be_bytes());
    payload
}

/// Read the sequence header, if the payload is long enough to carry one
pub fn read_sequence(payload: &[u8]) -> Option<u64> {
    let header: [u8; SEQUENCE_HEADER_LEN] = payload.get(..SEQUENCE_HEADER_LEN)?.try_into().ok()?;
    Some(u64::from_be_bytes(header))
}

/// Tracks sequence numbers seen by a consumer
///
/// Brokers in this harness deliver in order per topic, so any sequence at or
/// below the highest one already seen is a duplicate.
#[derive(Debug, Default, Clone)]
pub struct SequenceTracker {
    expected_len: usize,
    highest: Option<u64>,
}

/// Outcome of validating one received payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Well-formed, first time seen
    Valid,
    /// Wrong length or missing header
    Malformed,
    /// Sequence already observed
    Duplicate,
}

impl SequenceTracker {
    /// Track payloads expected to be `expected_len` bytes long
    pub fn new(expected_len: usize) -> Self {
        Self {
            expected_len: expected_len.max(SEQUENCE_HEADER_LEN),
            highest: None,
        }
    }

    /// Classify a received payload
    pub fn observe(&mut self, payload: &[u8]) -> Delivery {
        if payload.len() != self.expected_len {
            return Delivery::Malformed;
        }
        let Some(sequence) = read_sequence(payload) else {
            return Delivery::Malformed;
        };
        match self.highest {
            Some(highest) if sequence <= highest => Delivery::Duplicate,
            _ => {
                self.highest = Some(sequence);
                Delivery::Valid
            }
        }
    }
}
