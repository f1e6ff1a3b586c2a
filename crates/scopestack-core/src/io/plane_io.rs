use std::fs::File;
use std::io::{Cursor, ErrorKind};
use std::path::Path;

use memmap2::Mmap;
use ndarray::{Array3, ArrayView3, Axis};
use rayon::prelude::*;
use tiff::decoder::{Decoder, Limits};
use tiff::ColorType;

use crate::error::{Result, ScopeError};
use crate::organize::SourceFile;
use crate::plane::{Pixel, PixelType, PlaneInfo, PlaneStack};

fn unreadable(path: &Path, reason: impl ToString) -> ScopeError {
    ScopeError::PlaneUnreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Memory-map `path` and open a TIFF decoder over it.
fn open_decoder(path: &Path) -> Result<Decoder<Cursor<Mmap>>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ScopeError::PlaneNotFound {
            path: path.to_path_buf(),
        },
        _ => unreadable(path, e),
    })?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| unreadable(path, e))?;
    Decoder::new(Cursor::new(mmap))
        .map(|d| d.with_limits(Limits::unlimited()))
        .map_err(|e| unreadable(path, e))
}

fn pixel_type_of(path: &Path, decoder: &mut Decoder<Cursor<Mmap>>) -> Result<PixelType> {
    match decoder.colortype().map_err(|e| unreadable(path, e))? {
        ColorType::Gray(8) => Ok(PixelType::U8),
        ColorType::Gray(16) => Ok(PixelType::U16),
        other => Err(ScopeError::UnsupportedPixelType(format!(
            "{other:?} in {}",
            path.display()
        ))),
    }
}

/// Read pixel type, plane size and page count without decoding pixel data.
pub fn probe_plane(path: &Path) -> Result<PlaneInfo> {
    let mut decoder = open_decoder(path)?;
    let pixel_type = pixel_type_of(path, &mut decoder)?;
    let (width, height) = decoder.dimensions().map_err(|e| unreadable(path, e))?;

    let mut depth = 1;
    while decoder.more_images() {
        decoder.next_image().map_err(|e| unreadable(path, e))?;
        depth += 1;
    }

    Ok(PlaneInfo {
        pixel_type,
        width: width as usize,
        height: height as usize,
        depth,
    })
}

/// Decode every page of a TIFF into a (Z, Y, X) stack.
///
/// A plain 2-D file yields depth 1. All pages must share the first page's
/// size and pixel type.
pub fn load_stack<P: Pixel>(path: &Path) -> Result<PlaneStack<P>> {
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions().map_err(|e| unreadable(path, e))?;
    let (w, h) = (width as usize, height as usize);

    let mut data: Vec<P> = Vec::new();
    let mut depth = 0;
    loop {
        let dims = decoder.dimensions().map_err(|e| unreadable(path, e))?;
        if dims != (width, height) {
            return Err(unreadable(
                path,
                format!("page {depth} is {}x{}, first page is {w}x{h}", dims.0, dims.1),
            ));
        }
        let decoded = decoder.read_image().map_err(|e| unreadable(path, e))?;
        let mut page = P::from_decoded(decoded).map_err(|other| ScopeError::PixelTypeMismatch {
            path: path.to_path_buf(),
            expected: P::PIXEL_TYPE.to_string(),
            found: decoded_name(&other).to_string(),
        })?;
        if page.len() != w * h {
            return Err(unreadable(
                path,
                format!("page {depth} holds {} samples, expected {}", page.len(), w * h),
            ));
        }
        data.append(&mut page);
        depth += 1;

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| unreadable(path, e))?;
    }

    Array3::from_shape_vec((depth, h, w), data).map_err(|e| unreadable(path, e))
}

fn decoded_name(result: &tiff::decoder::DecodingResult) -> &'static str {
    use tiff::decoder::DecodingResult::*;
    match result {
        U8(_) => "uint8",
        U16(_) => "uint16",
        U32(_) => "uint32",
        U64(_) => "uint64",
        I8(_) => "int8",
        I16(_) => "int16",
        I32(_) => "int32",
        I64(_) => "int64",
        F32(_) => "float32",
        F64(_) => "float64",
        #[allow(unreachable_patterns)]
        _ => "other",
    }
}

/// Load `files` in order and concatenate them along Z.
///
/// Files are decoded in parallel. Every file must have the same (Y, X) size
/// as the first.
pub fn load_concatenated<P: Pixel>(files: &[SourceFile]) -> Result<PlaneStack<P>> {
    let first = files.first().ok_or(ScopeError::EmptySequence)?;
    let mut stacks = files
        .par_iter()
        .map(|f| load_stack::<P>(&f.path))
        .collect::<Result<Vec<_>>>()?;

    let frame = &stacks[0].shape()[1..];
    for (file, stack) in files.iter().zip(&stacks) {
        if &stack.shape()[1..] != frame {
            return Err(ScopeError::InconsistentGrouping(format!(
                "{} is {:?}, {} is {:?}",
                file.name,
                &stack.shape()[1..],
                first.name,
                frame
            )));
        }
    }

    if stacks.len() == 1 {
        return Ok(stacks.swap_remove(0));
    }
    let views: Vec<ArrayView3<'_, P>> = stacks.iter().map(|s| s.view()).collect();
    ndarray::concatenate(Axis(0), &views)
        .map_err(|e| ScopeError::Internal(format!("plane concatenation failed: {e}")))
}
