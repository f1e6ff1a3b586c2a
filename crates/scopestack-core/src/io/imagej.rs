//! ImageJ-compatible hyperstack TIFF writer.
//!
//! Pages are written C-fastest, then Z, then T, which is the row-major order
//! of every canonical axis layout. The first page carries the ImageJ
//! description block and the IJMetadata LUT tags.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use tiff::encoder::{Rational, TiffEncoder, TiffValue};
use tiff::tags::{ResolutionUnit, Tag};
use tracing::{info, warn};

use crate::assemble::{AnyHyperstack, Hyperstack};
use crate::consts::{IJ_METADATA_BYTE_COUNTS_TAG, IJ_METADATA_TAG, LARGE_HYPERSTACK_BYTES};
use crate::error::{Result, ScopeError};
use crate::io::lut::Lut;
use crate::io::metadata::AcquisitionMetadata;
use crate::plane::Pixel;

/// Receiver of finished hyperstacks.
pub trait HyperstackSink {
    fn write(
        &self,
        hyperstack: &AnyHyperstack,
        metadata: Option<&AcquisitionMetadata>,
        luts: &[Lut],
        path: &Path,
    ) -> Result<()>;
}

/// Writes ImageJ hyperstack TIFFs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageJTiffWriter;

impl HyperstackSink for ImageJTiffWriter {
    fn write(
        &self,
        hyperstack: &AnyHyperstack,
        metadata: Option<&AcquisitionMetadata>,
        luts: &[Lut],
        path: &Path,
    ) -> Result<()> {
        let bytes = hyperstack.byte_len();
        if bytes > LARGE_HYPERSTACK_BYTES {
            warn!(
                path = %path.display(),
                gib = bytes as f64 / LARGE_HYPERSTACK_BYTES as f64,
                "Large hyperstack, writing may be slow"
            );
        }
        match hyperstack {
            AnyHyperstack::U8(h) => write_hyperstack(h, metadata, luts, path),
            AnyHyperstack::U16(h) => write_hyperstack(h, metadata, luts, path),
        }
    }
}

/// Dimension counts ImageJ needs in its description block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HyperstackDims {
    pub channels: usize,
    pub slices: usize,
    pub frames: usize,
}

impl HyperstackDims {
    pub fn of<P: Pixel>(h: &Hyperstack<P>) -> Self {
        Self {
            channels: h.axis_len('C'),
            slices: h.axis_len('Z'),
            frames: h.axis_len('T'),
        }
    }

    pub fn images(self) -> usize {
        self.channels * self.slices * self.frames
    }
}

/// ImageJ `ImageDescription` text.
pub fn imagej_description(dims: HyperstackDims, metadata: Option<&AcquisitionMetadata>) -> String {
    let mut d = String::from("ImageJ=1.11a\n");
    d.push_str(&format!("images={}\n", dims.images()));
    d.push_str(&format!("channels={}\n", dims.channels));
    d.push_str(&format!("slices={}\n", dims.slices));
    d.push_str(&format!("frames={}\n", dims.frames));
    d.push_str("hyperstack=true\n");
    d.push_str("mode=composite\n");
    d.push_str("unit=um\n");
    if let Some(md) = metadata {
        if let Some(f) = md.framerate {
            d.push_str(&format!("finterval={f}\n"));
        }
        if let Some(z) = md.z_microns_per_pixel {
            d.push_str(&format!("spacing={z}\n"));
        }
    }
    d.push_str("loop=false\n");
    d
}

const IJ_MAGIC: u32 = 0x494a_494a; // "IJIJ"
const IJ_LUTS: u32 = 0x6c75_7473; // "luts"

/// IJMetadata payload and IJMetadataByteCounts for one LUT per channel.
///
/// Encoded little-endian to match the TIFF byte order. Channels beyond the
/// supplied LUTs get grays.
pub fn imagej_lut_tags(luts: &[Lut], channels: usize) -> Result<(Vec<u8>, Vec<u32>)> {
    let mut header = Vec::with_capacity(12);
    header.write_u32::<LittleEndian>(IJ_MAGIC)?;
    header.write_u32::<LittleEndian>(IJ_LUTS)?;
    header.write_u32::<LittleEndian>(channels as u32)?;

    let mut counts = vec![header.len() as u32];
    let mut data = header;
    for c in 0..channels {
        let table = luts.get(c).copied().unwrap_or(Lut::Grays).table();
        counts.push(table.len() as u32);
        data.write_all(&table)?;
    }
    Ok((data, counts))
}

/// Pixels per micron as a TIFF rational.
fn resolution(microns_per_pixel: f64) -> Rational {
    const DENOM: u32 = 1_000_000;
    let n = (DENOM as f64 / microns_per_pixel).round().clamp(1.0, u32::MAX as f64) as u32;
    Rational { n, d: DENOM }
}

fn write_hyperstack<P: Pixel>(
    h: &Hyperstack<P>,
    metadata: Option<&AcquisitionMetadata>,
    luts: &[Lut],
    path: &Path,
) -> Result<()>
where
    [P]: TiffValue,
{
    let shape = h.shape();
    let (height, width) = match shape {
        [.., y, x] => (*y, *x),
        _ => return Err(ScopeError::Internal(format!("hyperstack shape {shape:?}"))),
    };
    let data = h.data.as_standard_layout();
    let pixels = data
        .as_slice()
        .ok_or_else(|| ScopeError::Internal("hyperstack not contiguous".into()))?;
    let page_len = height * width;
    let dims = HyperstackDims::of(h);

    let description = imagej_description(dims, metadata);
    let (ij_data, ij_counts) = imagej_lut_tags(luts, dims.channels)?;
    let res = metadata.and_then(|md| md.x_microns_per_pixel.zip(md.y_microns_per_pixel));

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut encoder = TiffEncoder::new(&mut writer)?;

    for (i, page) in pixels.chunks(page_len.max(1)).enumerate() {
        let mut image = encoder.new_image::<P::Tiff>(width as u32, height as u32)?;
        if i == 0 {
            image
                .encoder()
                .write_tag(Tag::ImageDescription, description.as_str())?;
            image
                .encoder()
                .write_tag(Tag::Unknown(IJ_METADATA_BYTE_COUNTS_TAG), &ij_counts[..])?;
            image
                .encoder()
                .write_tag(Tag::Unknown(IJ_METADATA_TAG), &ij_data[..])?;
        }
        if let Some((x, y)) = res {
            image.resolution_unit(ResolutionUnit::None);
            image.x_resolution(resolution(x));
            image.y_resolution(resolution(y));
        }
        image.write_data(page)?;
    }
    drop(encoder);
    writer.flush()?;

    info!(
        path = %path.display(),
        axes = %h.axes,
        shape = ?shape,
        pages = dims.images(),
        "Wrote hyperstack"
    );
    Ok(())
}
