// File storage for arrays: one YAML document of named array nodes.

use std::collections::BTreeMap;
use std::ffi::CStr;
use std::path::Path;
use std::ptr;

use libc::{c_char, c_int, c_void};
use serde::{Deserialize, Serialize};

use super::arrays::{create_mat, create_mat_nd};
use super::{cv_alloc, raise};
use crate::ffi::cxcore_sys::*;

const TYPE_ID_MAT: &str = "opencv-matrix";
const TYPE_ID_MATND: &str = "opencv-nd-matrix";

/// Depth codes in `dt`, indexed by depth.
const DEPTH_CODES: &[u8; 8] = b"ucwsifdr";

#[derive(Debug, Serialize, Deserialize)]
struct StorageDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    nodes: BTreeMap<String, StoredNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredNode {
    type_id: String,
    sizes: Vec<c_int>,
    dt: String,
    data: Vec<u8>,
}

/// Element type code, e.g. `u` for 8-bit unsigned or `3f` for three float channels.
fn encode_dt(type_: c_int) -> String {
    let code = DEPTH_CODES[CV_MAT_DEPTH(type_) as usize] as char;
    match CV_MAT_CN(type_) {
        1 => code.to_string(),
        cn => format!("{cn}{code}"),
    }
}

fn decode_dt(dt: &str) -> Option<c_int> {
    let split = dt.find(|c: char| !c.is_ascii_digit())?;
    let (count, code) = dt.split_at(split);
    if code.len() != 1 {
        return None;
    }
    let depth = DEPTH_CODES.iter().position(|&c| c == code.as_bytes()[0])? as c_int;
    let cn = if count.is_empty() {
        1
    } else {
        count.parse::<c_int>().ok()?
    };
    if !(1..=CV_CN_MAX).contains(&cn) {
        return None;
    }
    Some(CV_MAKETYPE(depth, cn))
}

/// Node name used when the caller gives none: the file stem made identifier-safe.
pub(crate) fn default_object_name(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    };

    let mut name: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    match name.chars().next() {
        None => name.push('_'),
        Some(first) if !(first.is_ascii_alphabetic() || first == '_') => name.insert(0, '_'),
        _ => {}
    }
    name
}

unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

unsafe fn node_from_object(obj: *const c_void) -> Result<StoredNode, &'static str> {
    match unsafe { header_magic(obj) } {
        CV_MATND_MAGIC_VAL => {
            let mat = unsafe { &*(obj as *const CvMatND) };
            if mat.data.is_null() {
                return Err("The array has no data");
            }
            let total = (mat.dim[0].step as usize) * (mat.dim[0].size as usize);
            Ok(StoredNode {
                type_id: TYPE_ID_MATND.to_string(),
                sizes: mat.dim[..mat.dims as usize].iter().map(|d| d.size).collect(),
                dt: encode_dt(mat.type_),
                data: unsafe { std::slice::from_raw_parts(mat.data, total) }.to_vec(),
            })
        }
        CV_MAT_MAGIC_VAL => {
            let mat = unsafe { &*(obj as *const CvMat) };
            if mat.data.is_null() {
                return Err("The matrix has no data");
            }
            let total = (mat.step as usize) * (mat.rows as usize);
            Ok(StoredNode {
                type_id: TYPE_ID_MAT.to_string(),
                sizes: vec![mat.rows, mat.cols],
                dt: encode_dt(mat.type_),
                data: unsafe { std::slice::from_raw_parts(mat.data, total) }.to_vec(),
            })
        }
        _ => Err("Unsupported object type"),
    }
}

pub(super) unsafe extern "C" fn save(
    filename: *const c_char,
    struct_ptr: *const c_void,
    name: *const c_char,
    comment: *const c_char,
    _attributes: CvAttrList,
) {
    let Some(filename) = (unsafe { c_str(filename) }) else {
        raise(CV_StsNullPtr, c"cvSave", "NULL filename", line!());
        return;
    };
    if struct_ptr.is_null() {
        raise(CV_StsNullPtr, c"cvSave", "NULL object pointer", line!());
        return;
    }

    let node = match unsafe { node_from_object(struct_ptr) } {
        Ok(node) => node,
        Err(msg) => {
            raise(CV_StsBadArg, c"cvSave", msg, line!());
            return;
        }
    };
    let name = match unsafe { c_str(name) } {
        Some(name) => name.to_string(),
        None => default_object_name(filename),
    };

    let mut nodes = BTreeMap::new();
    nodes.insert(name, node);
    let doc = StorageDocument {
        comment: unsafe { c_str(comment) }.map(str::to_string),
        nodes,
    };

    let text = match serde_yml::to_string(&doc) {
        Ok(text) => text,
        Err(e) => {
            raise(CV_StsError, c"cvSave", &e.to_string(), line!());
            return;
        }
    };
    if let Err(e) = std::fs::write(Path::new(filename), text) {
        raise(
            CV_StsError,
            c"cvSave",
            &format!("Could not open file storage {filename}: {e}"),
            line!(),
        );
    }
}

unsafe fn object_from_node(node: &StoredNode) -> Result<*mut c_void, (c_int, String)> {
    let type_ = decode_dt(&node.dt)
        .ok_or_else(|| (CV_StsParseError, format!("Invalid element type '{}'", node.dt)))?;

    let mut expected = CV_ELEM_SIZE(type_) as usize;
    for &size in &node.sizes {
        if size < 0 {
            return Err((CV_StsParseError, "Negative dimension size".to_string()));
        }
        expected = expected.saturating_mul(size as usize);
    }
    if node.data.len() != expected {
        return Err((
            CV_StsParseError,
            format!("Expected {expected} data bytes, found {}", node.data.len()),
        ));
    }

    let (obj, data) = match node.type_id.as_str() {
        TYPE_ID_MATND => {
            let mat = unsafe {
                create_mat_nd(node.sizes.len() as c_int, node.sizes.as_ptr(), type_)
            };
            if mat.is_null() {
                return Ok(ptr::null_mut());
            }
            (mat as *mut c_void, unsafe { (*mat).data })
        }
        TYPE_ID_MAT if node.sizes.len() == 2 => {
            let mat = unsafe { create_mat(node.sizes[0], node.sizes[1], type_) };
            if mat.is_null() {
                return Ok(ptr::null_mut());
            }
            (mat as *mut c_void, unsafe { (*mat).data })
        }
        other => {
            return Err((
                CV_StsUnsupportedFormat,
                format!("Unknown type id '{other}'"),
            ));
        }
    };

    unsafe { ptr::copy_nonoverlapping(node.data.as_ptr(), data, node.data.len()) };
    Ok(obj)
}

pub(super) unsafe extern "C" fn load(
    filename: *const c_char,
    memstorage: *mut CvMemStorage,
    name: *const c_char,
    real_name: *mut *const c_char,
) -> *mut c_void {
    if !real_name.is_null() {
        unsafe { *real_name = ptr::null() };
    }
    let Some(filename) = (unsafe { c_str(filename) }) else {
        raise(CV_StsNullPtr, c"cvLoad", "NULL filename", line!());
        return ptr::null_mut();
    };
    if !memstorage.is_null()
        && unsafe { header_magic(memstorage as *const c_void) } != CV_STORAGE_MAGIC_VAL
    {
        raise(CV_StsBadArg, c"cvLoad", "Invalid memory storage", line!());
        return ptr::null_mut();
    }

    let text = match std::fs::read_to_string(filename) {
        Ok(text) => text,
        Err(e) => {
            raise(
                CV_StsError,
                c"cvLoad",
                &format!("Could not open file storage {filename}: {e}"),
                line!(),
            );
            return ptr::null_mut();
        }
    };
    let doc: StorageDocument = match serde_yml::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => {
            raise(CV_StsParseError, c"cvLoad", &e.to_string(), line!());
            return ptr::null_mut();
        }
    };

    let found = match unsafe { c_str(name) } {
        Some(name) => doc.nodes.get_key_value(name),
        None => doc.nodes.iter().next(),
    };
    let Some((found_name, node)) = found else {
        raise(
            CV_StsObjectNotFound,
            c"cvLoad",
            "Could not find the requested object in file storage",
            line!(),
        );
        return ptr::null_mut();
    };

    let obj = match unsafe { object_from_node(node) } {
        Ok(obj) => obj,
        Err((status, msg)) => {
            raise(status, c"cvLoad", &msg, line!());
            return ptr::null_mut();
        }
    };
    if obj.is_null() {
        return obj;
    }

    if !real_name.is_null() {
        let bytes = found_name.as_bytes();
        let copy = unsafe { cv_alloc(bytes.len() + 1) } as *mut u8;
        if !copy.is_null() {
            unsafe {
                ptr::copy_nonoverlapping(bytes.as_ptr(), copy, bytes.len());
                *copy.add(bytes.len()) = 0;
                *real_name = copy as *const c_char;
            }
        }
    }
    obj
}
