use bytes::{BufMut, Bytes, BytesMut};

/// `tfdt` box type followed by version 1 and zero flags. A version 1 box
/// carries a 64-bit base media decode time right after this prefix.
pub const TFDT_MARKER: [u8; 8] = [b't', b'f', b'd', b't', 1, 0, 0, 0];

const TIMESTAMP_LEN: usize = 8;

/// Rewrites the decode time of a replayed fragment so it lines up with the
/// virtual sequence it is served as.
#[derive(Debug, Clone, Copy)]
pub struct FragmentPatcher {
    segment_duration: u64,
}

impl FragmentPatcher {
    /// `segment_duration` is expressed in the media timescale.
    pub fn new(segment_duration: u64) -> Self {
        FragmentPatcher { segment_duration }
    }

    /// Media time at which `sequence` starts, wrapping on overflow.
    pub fn sequence_offset(&self, sequence: u64) -> u64 {
        sequence.wrapping_mul(self.segment_duration)
    }

    /// Returns a copy of `fragment` whose first `tfdt` decode time is shifted
    /// by the start time of `sequence`. Fragments without the marker, or with
    /// a marker too close to the end to hold a timestamp, come back unchanged.
    pub fn patch(&self, fragment: &[u8], sequence: u64) -> Bytes {
        let Some(field) = timestamp_position(fragment) else {
            return Bytes::copy_from_slice(fragment);
        };

        let base = read_u64(fragment, field);
        let patched = base.wrapping_add(self.sequence_offset(sequence));

        let mut out = BytesMut::with_capacity(fragment.len());
        out.put_slice(&fragment[..field]);
        out.put_u64(patched);
        out.put_slice(&fragment[field + TIMESTAMP_LEN..]);
        out.freeze()
    }
}

/// Base media decode time of the first version 1 `tfdt` box, if any.
pub fn base_decode_time(fragment: &[u8]) -> Option<u64> {
    timestamp_position(fragment).map(|field| read_u64(fragment, field))
}

/// Byte offset of the timestamp following the first marker.
fn timestamp_position(fragment: &[u8]) -> Option<usize> {
    let marker = fragment
        .windows(TFDT_MARKER.len())
        .position(|window| window == TFDT_MARKER)?;

    let field = marker + TFDT_MARKER.len();
    if fragment.len() < field + TIMESTAMP_LEN {
        return None;
    }

    Some(field)
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; TIMESTAMP_LEN];
    raw.copy_from_slice(&data[at..at + TIMESTAMP_LEN]);
    u64::from_be_bytes(raw)
}
