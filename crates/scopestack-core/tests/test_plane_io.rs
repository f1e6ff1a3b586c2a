mod common;

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use scopestack_core::coords::AcquisitionCoordinate;
use scopestack_core::error::ScopeError;
use scopestack_core::io::plane_io::{load_concatenated, load_stack, probe_plane};
use scopestack_core::organize::SourceFile;
use scopestack_core::plane::PixelType;

use common::{flat, write_tiff_u16, write_tiff_u8, H, W};

fn source(path: &Path) -> SourceFile {
    SourceFile {
        path: path.to_path_buf(),
        name: path.file_name().unwrap().to_string_lossy().into_owned(),
        coord: AcquisitionCoordinate::default(),
    }
}

#[test]
fn test_probe_reports_type_size_and_pages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stack.tif");
    write_tiff_u16(&path, W, H, &[flat(1), flat(2), flat(3)]);

    let info = probe_plane(&path).unwrap();
    assert_eq!(info.pixel_type, PixelType::U16);
    assert_eq!((info.width, info.height, info.depth), (W, H, 3));
}

#[test]
fn test_probe_8bit_plane() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plane.tif");
    write_tiff_u8(&path, W, H, &[vec![7u8; W * H]]);

    let info = probe_plane(&path).unwrap();
    assert_eq!(info.pixel_type, PixelType::U8);
    assert_eq!(info.depth, 1);
}

#[test]
fn test_load_stack_keeps_page_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stack.tif");
    write_tiff_u16(&path, W, H, &[flat(10), flat(20), flat(30)]);

    let stack = load_stack::<u16>(&path).unwrap();
    assert_eq!(stack.dim(), (3, H, W));
    assert_eq!(stack[[0, 0, 0]], 10);
    assert_eq!(stack[[2, H - 1, W - 1]], 30);
}

#[test]
fn test_load_concatenated_appends_along_z() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.tif");
    let b = dir.path().join("b.tif");
    write_tiff_u16(&a, W, H, &[flat(1)]);
    write_tiff_u16(&b, W, H, &[flat(2), flat(3)]);

    let stack = load_concatenated::<u16>(&[source(&a), source(&b)]).unwrap();
    assert_eq!(stack.dim(), (3, H, W));
    let firsts: Vec<u16> = (0..3).map(|z| stack[[z, 0, 0]]).collect();
    assert_eq!(firsts, vec![1, 2, 3]);
}

#[test]
fn test_load_concatenated_rejects_differing_sizes() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.tif");
    let b = dir.path().join("b.tif");
    write_tiff_u16(&a, W, H, &[flat(1)]);
    write_tiff_u16(&b, W + 1, H, &[vec![1u16; (W + 1) * H]]);

    let err = load_concatenated::<u16>(&[source(&a), source(&b)]).unwrap_err();
    assert!(matches!(err, ScopeError::InconsistentGrouping(_)));
}

#[test]
fn test_load_concatenated_of_nothing_fails() {
    let err = load_concatenated::<u16>(&[]).unwrap_err();
    assert!(matches!(err, ScopeError::EmptySequence));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = load_stack::<u16>(&dir.path().join("gone.tif")).unwrap_err();
    assert!(matches!(err, ScopeError::PlaneNotFound { .. }));
}

#[test]
fn test_garbage_file_is_unreadable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.tif");
    fs::write(&path, b"definitely not a tiff").unwrap();

    let err = probe_plane(&path).unwrap_err();
    assert!(matches!(err, ScopeError::PlaneUnreadable { .. }));
}

#[test]
fn test_pixel_type_mismatch_names_both_types() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plane.tif");
    write_tiff_u8(&path, W, H, &[vec![1u8; W * H]]);

    match load_stack::<u16>(&path).unwrap_err() {
        ScopeError::PixelTypeMismatch { expected, found, .. } => {
            assert_eq!(expected, "uint16");
            assert_eq!(found, "uint8");
        }
        other => panic!("unexpected error: {other}"),
    }
}
