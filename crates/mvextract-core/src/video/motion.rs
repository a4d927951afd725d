//! Motion vectors exported by the decoder as frame side data.

use std::mem::{offset_of, size_of};

use tracing::debug;

use crate::error::CaptureError;

/// Number of `i32` columns per motion vector in the flat buffer.
pub const MOTION_VECTOR_COLUMNS: usize = 10;

/// One motion vector of a predicted macroblock.
///
/// `src_x = dst_x + motion_x / motion_scale` and likewise for y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionVector {
    /// Negative when the block is predicted from a past frame, positive from a future one.
    pub source: i32,
    /// Macroblock width.
    pub w: i32,
    /// Macroblock height.
    pub h: i32,
    pub src_x: i32,
    pub src_y: i32,
    pub dst_x: i32,
    pub dst_y: i32,
    pub motion_x: i32,
    pub motion_y: i32,
    pub motion_scale: i32,
}

impl MotionVector {
    /// The vector as one row of the flat buffer, in fixed column order.
    pub fn to_row(&self) -> [i32; MOTION_VECTOR_COLUMNS] {
        [
            self.source,
            self.w,
            self.h,
            self.src_x,
            self.src_y,
            self.dst_x,
            self.dst_y,
            self.motion_x,
            self.motion_y,
            self.motion_scale,
        ]
    }
}

impl From<&MotionVector> for mvextract_proto::proto::MotionVector {
    fn from(mv: &MotionVector) -> Self {
        Self {
            source: mv.source,
            w: mv.w,
            h: mv.h,
            src_x: mv.src_x,
            src_y: mv.src_y,
            dst_x: mv.dst_x,
            dst_y: mv.dst_y,
            motion_x: mv.motion_x,
            motion_y: mv.motion_y,
            motion_scale: mv.motion_scale,
        }
    }
}

/// Row-major `count x 10` buffer of the given vectors.
pub fn flatten(vectors: &[MotionVector]) -> Vec<i32> {
    vectors.iter().flat_map(|mv| mv.to_row()).collect()
}

/// C layout of libavutil's `AVMotionVector`, the record type of the
/// motion-vector side data.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeMotionVector {
    pub source: i32,
    pub w: u8,
    pub h: u8,
    pub src_x: i16,
    pub src_y: i16,
    pub dst_x: i16,
    pub dst_y: i16,
    pub flags: u64,
    pub motion_x: i32,
    pub motion_y: i32,
    pub motion_scale: u16,
}

/// Size of one native record in the side-data buffer.
pub const NATIVE_RECORD_SIZE: usize = size_of::<NativeMotionVector>();

impl NativeMotionVector {
    fn decode(record: &[u8]) -> Self {
        Self {
            source: i32::from_ne_bytes(field(record, offset_of!(NativeMotionVector, source))),
            w: record[offset_of!(NativeMotionVector, w)],
            h: record[offset_of!(NativeMotionVector, h)],
            src_x: i16::from_ne_bytes(field(record, offset_of!(NativeMotionVector, src_x))),
            src_y: i16::from_ne_bytes(field(record, offset_of!(NativeMotionVector, src_y))),
            dst_x: i16::from_ne_bytes(field(record, offset_of!(NativeMotionVector, dst_x))),
            dst_y: i16::from_ne_bytes(field(record, offset_of!(NativeMotionVector, dst_y))),
            flags: u64::from_ne_bytes(field(record, offset_of!(NativeMotionVector, flags))),
            motion_x: i32::from_ne_bytes(field(record, offset_of!(NativeMotionVector, motion_x))),
            motion_y: i32::from_ne_bytes(field(record, offset_of!(NativeMotionVector, motion_y))),
            motion_scale: u16::from_ne_bytes(field(
                record,
                offset_of!(NativeMotionVector, motion_scale),
            )),
        }
    }

    /// Serialize into the side-data byte layout, padding zeroed.
    #[cfg(test)]
    pub(crate) fn encode(&self) -> Vec<u8> {
        fn put(out: &mut [u8], offset: usize, bytes: &[u8]) {
            out[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        let mut out = vec![0u8; NATIVE_RECORD_SIZE];
        put(&mut out, offset_of!(NativeMotionVector, source), &self.source.to_ne_bytes());
        put(&mut out, offset_of!(NativeMotionVector, w), &[self.w]);
        put(&mut out, offset_of!(NativeMotionVector, h), &[self.h]);
        put(&mut out, offset_of!(NativeMotionVector, src_x), &self.src_x.to_ne_bytes());
        put(&mut out, offset_of!(NativeMotionVector, src_y), &self.src_y.to_ne_bytes());
        put(&mut out, offset_of!(NativeMotionVector, dst_x), &self.dst_x.to_ne_bytes());
        put(&mut out, offset_of!(NativeMotionVector, dst_y), &self.dst_y.to_ne_bytes());
        put(&mut out, offset_of!(NativeMotionVector, flags), &self.flags.to_ne_bytes());
        put(&mut out, offset_of!(NativeMotionVector, motion_x), &self.motion_x.to_ne_bytes());
        put(&mut out, offset_of!(NativeMotionVector, motion_y), &self.motion_y.to_ne_bytes());
        put(
            &mut out,
            offset_of!(NativeMotionVector, motion_scale),
            &self.motion_scale.to_ne_bytes(),
        );
        out
    }
}

impl From<NativeMotionVector> for MotionVector {
    fn from(native: NativeMotionVector) -> Self {
        Self {
            source: native.source,
            w: native.w.into(),
            h: native.h.into(),
            src_x: native.src_x.into(),
            src_y: native.src_y.into(),
            dst_x: native.dst_x.into(),
            dst_y: native.dst_y.into(),
            motion_x: native.motion_x,
            motion_y: native.motion_y,
            motion_scale: native.motion_scale.into(),
        }
    }
}

fn field<const N: usize>(record: &[u8], offset: usize) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&record[offset..offset + N]);
    bytes
}

/// Map the motion-vector side data of one frame into a fresh buffer.
///
/// The record count is `side_data.len() / NATIVE_RECORD_SIZE`; a trailing
/// partial record is ignored. No allocation happens when the count is zero.
pub fn from_side_data(side_data: &[u8]) -> Result<Vec<MotionVector>, CaptureError> {
    let count = side_data.len() / NATIVE_RECORD_SIZE;
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut vectors = Vec::new();
    vectors
        .try_reserve_exact(count)
        .map_err(|_| CaptureError::Allocation { count })?;
    vectors.extend(
        side_data
            .chunks_exact(NATIVE_RECORD_SIZE)
            .map(|record| MotionVector::from(NativeMotionVector::decode(record))),
    );

    debug!(count, bytes = side_data.len(), "mapped motion vectors");
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(i: i16) -> NativeMotionVector {
        NativeMotionVector {
            source: if i % 2 == 0 { -1 } else { 1 },
            w: 16,
            h: 8,
            src_x: 100 + i,
            src_y: -5 - i,
            dst_x: 96 + i,
            dst_y: 0,
            flags: 0xdead_beef,
            motion_x: -17 * i as i32,
            motion_y: 3,
            motion_scale: 4,
        }
    }

    #[test]
    fn native_record_matches_libavutil_layout() {
        assert_eq!(offset_of!(NativeMotionVector, src_x), 6);
        assert_eq!(offset_of!(NativeMotionVector, flags), 16);
        assert_eq!(offset_of!(NativeMotionVector, motion_scale), 32);
    }

    #[test]
    fn empty_side_data_yields_no_vectors() {
        let vectors = from_side_data(&[]).unwrap();
        assert!(vectors.is_empty());
        assert_eq!(vectors.capacity(), 0);
    }

    #[test]
    fn records_map_in_column_order() {
        let records: Vec<NativeMotionVector> = (0..3).map(native).collect();
        let bytes: Vec<u8> = records.iter().flat_map(|r| r.encode()).collect();

        let vectors = from_side_data(&bytes).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[2].to_row(), [-1, 16, 8, 102, -7, 98, 0, -34, 3, 4]);
        assert_eq!(vectors[1].source, 1);
    }

    #[test]
    fn trailing_partial_record_is_ignored() {
        let mut bytes = native(1).encode();
        bytes.extend_from_slice(&[0xff; 7]);
        let vectors = from_side_data(&bytes).unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].src_x, 101);
    }

    #[test]
    fn flatten_is_row_major() {
        let a = MotionVector { source: -1, w: 16, ..Default::default() };
        let b = MotionVector { motion_scale: 2, ..Default::default() };
        let flat = flatten(&[a, b]);
        assert_eq!(flat.len(), 2 * MOTION_VECTOR_COLUMNS);
        assert_eq!(&flat[..2], &[-1, 16]);
        assert_eq!(flat[19], 2);
    }

    #[test]
    fn converts_to_proto_record() {
        let mv = MotionVector::from(native(2));
        let proto = mvextract_proto::proto::MotionVector::from(&mv);
        assert_eq!(proto.src_x, 102);
        assert_eq!(proto.motion_x, -34);
    }
}
