// Polygon drawing calls whose native signatures take jagged point lists.

use libc::c_int;

use crate::error::Result;
use crate::ffi::cxcore_sys::{CvPoint, CvScalar};
use crate::marshal::with_jagged;
use crate::resource::array::NativeArray;

pub type Point = CvPoint;

impl CvPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        CvPoint { x, y }
    }
}

pub type Scalar = CvScalar;

impl CvScalar {
    pub const fn new(v0: f64, v1: f64, v2: f64, v3: f64) -> Self {
        CvScalar {
            val: [v0, v1, v2, v3],
        }
    }

    /// Same value in every channel.
    pub const fn all(v: f64) -> Self {
        CvScalar { val: [v; 4] }
    }
}

/// Line connectivity passed through to the native rasteriser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum LineType {
    Connected4 = 4,
    #[default]
    Connected8 = 8,
    AntiAliased = 16,
}

/// Fill the area bounded by one or more polygonal contours.
///
/// The per-contour point counts and the contour count passed to native code
/// are the slice lengths. To draw only part of a contour, pass a sub-slice.
pub fn fill_poly<A, C>(
    img: &mut A,
    contours: &[C],
    color: Scalar,
    line_type: LineType,
    shift: i32,
) -> Result<()>
where
    A: NativeArray + ?Sized,
    C: AsRef<[Point]>,
{
    let arr = img.as_arr_ptr()?;
    let api = img.context().api();
    with_jagged::<Point, _, _, _>(contours, |args| unsafe {
        (api.cvFillPoly)(
            arr,
            args.addrs,
            args.counts,
            args.count,
            color,
            line_type as c_int,
            shift,
        )
    })?;
    img.context().check_status("cvFillPoly")
}

/// Draw one or more polygonal chains.
///
/// Point counts come from the slice lengths, as in [`fill_poly`].
#[allow(clippy::too_many_arguments)]
pub fn poly_line<A, C>(
    img: &mut A,
    contours: &[C],
    is_closed: bool,
    color: Scalar,
    thickness: i32,
    line_type: LineType,
    shift: i32,
) -> Result<()>
where
    A: NativeArray + ?Sized,
    C: AsRef<[Point]>,
{
    let arr = img.as_arr_ptr()?;
    let api = img.context().api();
    with_jagged::<Point, _, _, _>(contours, |args| unsafe {
        (api.cvPolyLine)(
            arr,
            args.addrs,
            args.counts,
            args.count,
            is_closed as c_int,
            color,
            thickness,
            line_type as c_int,
            shift,
        )
    })?;
    img.context().check_status("cvPolyLine")
}
