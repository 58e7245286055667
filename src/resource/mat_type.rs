use libc::c_int;

use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::{
    CV_CN_MAX, CV_ELEM_SIZE, CV_MAKETYPE, CV_MAT_CN, CV_MAT_DEPTH, CV_MAT_TYPE,
};

/// Bit depth of array elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MatDepth {
    U8 = 0,
    S8 = 1,
    U16 = 2,
    S16 = 3,
    S32 = 4,
    F32 = 5,
    F64 = 6,
    UserType = 7,
}

impl MatDepth {
    /// Decode the depth bits of a packed type field. Total: every 3-bit value is a depth.
    pub fn from_raw(flags: c_int) -> Self {
        match CV_MAT_DEPTH(flags) {
            0 => MatDepth::U8,
            1 => MatDepth::S8,
            2 => MatDepth::U16,
            3 => MatDepth::S16,
            4 => MatDepth::S32,
            5 => MatDepth::F32,
            6 => MatDepth::F64,
            _ => MatDepth::UserType,
        }
    }

    /// Size of one channel in bytes.
    pub fn channel_size(self) -> usize {
        CV_ELEM_SIZE(self as c_int) as usize
    }
}

/// Packed element type: depth plus channel count, as stored in array headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatType(c_int);

impl MatType {
    pub fn new(depth: MatDepth, channels: i32) -> Result<Self> {
        if !(1..=CV_CN_MAX).contains(&channels) {
            return Err(CvError::invalid_argument(format!(
                "channel count must be in 1..={CV_CN_MAX}, got {channels}"
            )));
        }
        Ok(MatType(CV_MAKETYPE(depth as c_int, channels)))
    }

    /// Extract the element type from a header's full flags word.
    pub fn from_flags(flags: c_int) -> Self {
        MatType(CV_MAT_TYPE(flags))
    }

    pub fn raw(self) -> c_int {
        self.0
    }

    pub fn depth(self) -> MatDepth {
        MatDepth::from_raw(self.0)
    }

    pub fn channels(self) -> i32 {
        CV_MAT_CN(self.0)
    }

    /// Bytes per element, all channels included.
    pub fn elem_size(self) -> usize {
        CV_ELEM_SIZE(self.0) as usize
    }
}

/// Element size times the product of extents, or `None` on overflow or a negative extent.
pub(crate) fn total_bytes(elem_size: usize, sizes: &[c_int]) -> Option<u64> {
    sizes.iter().try_fold(elem_size as u64, |acc, &s| {
        u64::try_from(s).ok().and_then(|s| acc.checked_mul(s))
    })
}
