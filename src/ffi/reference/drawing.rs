// Polygon entry points taking jagged point lists.
//
// Arguments are validated in full before anything is written, so a rejected
// call leaves the image untouched. Only contour vertices are plotted.

use std::ffi::CStr;

use libc::{c_int, c_void};

use super::raise;
use crate::ffi::cxcore_sys::*;

const XY_SHIFT: c_int = 16;
const MAX_THICKNESS: c_int = 32767;

/// 8-bit 2-D view of a `CvMat` or two-dimensional `CvMatND`.
struct Plane {
    data: *mut u8,
    rows: c_int,
    cols: c_int,
    step: usize,
    channels: usize,
}

unsafe fn plane_of(img: *mut c_void, func: &CStr) -> Option<Plane> {
    if img.is_null() {
        raise(CV_StsNullPtr, func, "NULL image", line!());
        return None;
    }
    let (type_, data, rows, cols, step) = match unsafe { header_magic(img) } {
        CV_MAT_MAGIC_VAL => {
            let mat = unsafe { &*(img as *const CvMat) };
            (mat.type_, mat.data, mat.rows, mat.cols, mat.step as usize)
        }
        CV_MATND_MAGIC_VAL if unsafe { (*(img as *const CvMatND)).dims } == 2 => {
            let mat = unsafe { &*(img as *const CvMatND) };
            (
                mat.type_,
                mat.data,
                mat.dim[0].size,
                mat.dim[1].size,
                mat.dim[0].step as usize,
            )
        }
        _ => {
            raise(CV_StsBadArg, func, "Unsupported image: expected a 2-D array", line!());
            return None;
        }
    };
    if data.is_null() {
        raise(CV_StsNullPtr, func, "The image has no data", line!());
        return None;
    }
    if CV_MAT_DEPTH(type_) != 0 {
        raise(CV_StsUnsupportedFormat, func, "Only 8-bit unsigned images are supported", line!());
        return None;
    }
    Some(Plane {
        data,
        rows,
        cols,
        step,
        channels: CV_MAT_CN(type_) as usize,
    })
}

/// Validate the jagged point list and return one slice per contour.
unsafe fn contours_of<'a>(
    pts: *mut *mut CvPoint,
    npts: *const c_int,
    contours: c_int,
    shift: c_int,
    func: &CStr,
) -> Option<Vec<&'a [CvPoint]>> {
    if pts.is_null() || npts.is_null() {
        raise(CV_StsNullPtr, func, "NULL point list or point counts", line!());
        return None;
    }
    if contours <= 0 {
        raise(CV_StsBadArg, func, "The number of contours must be positive", line!());
        return None;
    }
    if !(0..=XY_SHIFT).contains(&shift) {
        raise(CV_StsOutOfRange, func, "shift must be between 0 and 16", line!());
        return None;
    }

    let heads = unsafe { std::slice::from_raw_parts(pts, contours as usize) };
    let counts = unsafe { std::slice::from_raw_parts(npts, contours as usize) };
    let mut out = Vec::with_capacity(heads.len());
    for (&head, &count) in heads.iter().zip(counts) {
        if head.is_null() || count <= 0 {
            raise(CV_StsBadArg, func, "Every contour must contain at least one point", line!());
            return None;
        }
        out.push(unsafe { std::slice::from_raw_parts(head as *const CvPoint, count as usize) });
    }
    Some(out)
}

fn saturate_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

unsafe fn plot_vertices(plane: &Plane, contours: &[&[CvPoint]], color: CvScalar, shift: c_int) {
    for point in contours.iter().flat_map(|c| c.iter()) {
        let (x, y) = (point.x >> shift, point.y >> shift);
        if x < 0 || y < 0 || x >= plane.cols || y >= plane.rows {
            continue;
        }
        let offset = y as usize * plane.step + x as usize * plane.channels;
        for c in 0..plane.channels {
            let value = color.val.get(c).copied().unwrap_or(0.0);
            unsafe { *plane.data.add(offset + c) = saturate_u8(value) };
        }
    }
}

pub(super) unsafe extern "C" fn fill_poly(
    img: *mut c_void,
    pts: *mut *mut CvPoint,
    npts: *const c_int,
    contours: c_int,
    color: CvScalar,
    _line_type: c_int,
    shift: c_int,
) {
    let Some(plane) = (unsafe { plane_of(img, c"cvFillPoly") }) else {
        return;
    };
    let Some(contours) = (unsafe { contours_of(pts, npts, contours, shift, c"cvFillPoly") })
    else {
        return;
    };
    unsafe { plot_vertices(&plane, &contours, color, shift) };
}

pub(super) unsafe extern "C" fn poly_line(
    img: *mut c_void,
    pts: *mut *mut CvPoint,
    npts: *const c_int,
    contours: c_int,
    _is_closed: c_int,
    color: CvScalar,
    thickness: c_int,
    _line_type: c_int,
    shift: c_int,
) {
    if !(1..=MAX_THICKNESS).contains(&thickness) {
        raise(CV_StsOutOfRange, c"cvPolyLine", "thickness must be positive", line!());
        return;
    }
    let Some(plane) = (unsafe { plane_of(img, c"cvPolyLine") }) else {
        return;
    };
    let Some(contours) = (unsafe { contours_of(pts, npts, contours, shift, c"cvPolyLine") })
    else {
        return;
    };
    unsafe { plot_vertices(&plane, &contours, color, shift) };
}
