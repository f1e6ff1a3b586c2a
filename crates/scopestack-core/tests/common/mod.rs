#![allow(dead_code)]

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use scopestack_core::pipeline::config::ConversionConfig;

/// Plane height used by the synthetic acquisitions.
pub const H: usize = 4;
/// Plane width used by the synthetic acquisitions.
pub const W: usize = 6;

/// Write a 16-bit TIFF with one page per entry of `pages`.
pub fn write_tiff_u16(path: &Path, width: usize, height: usize, pages: &[Vec<u16>]) {
    let file = File::create(path).unwrap();
    let mut writer = BufWriter::new(file);
    let mut encoder = TiffEncoder::new(&mut writer).unwrap();
    for page in pages {
        assert_eq!(page.len(), width * height);
        encoder
            .write_image::<colortype::Gray16>(width as u32, height as u32, page)
            .unwrap();
    }
}

/// Write an 8-bit TIFF with one page per entry of `pages`.
pub fn write_tiff_u8(path: &Path, width: usize, height: usize, pages: &[Vec<u8>]) {
    let file = File::create(path).unwrap();
    let mut writer = BufWriter::new(file);
    let mut encoder = TiffEncoder::new(&mut writer).unwrap();
    for page in pages {
        encoder
            .write_image::<colortype::Gray8>(width as u32, height as u32, page)
            .unwrap();
    }
}

/// A plane filled with `value`.
pub fn flat(value: u16) -> Vec<u16> {
    vec![value; H * W]
}

/// Read every page of a 16-bit TIFF.
pub fn read_pages_u16(path: &Path) -> Vec<Vec<u16>> {
    let mut decoder = Decoder::new(File::open(path).unwrap()).unwrap();
    let mut pages = Vec::new();
    loop {
        match decoder.read_image().unwrap() {
            DecodingResult::U16(v) => pages.push(v),
            _ => panic!("expected 16-bit pages"),
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().unwrap();
    }
    pages
}

/// ImageDescription of the first page.
pub fn read_description(path: &Path) -> String {
    let mut decoder = Decoder::new(File::open(path).unwrap()).unwrap();
    decoder.get_tag_ascii_string(Tag::ImageDescription).unwrap()
}

/// Pixel value encoding a (channel, timepoint, z) coordinate.
pub fn code(channel: u32, t: u32, z: u32) -> u16 {
    (channel * 1000 + t * 10 + z) as u16
}

pub fn bruker_name(cycle: u32, channel: u32, plane: u32) -> String {
    format!("TSeries-01012024-0000-001_Cycle{cycle:05}_Ch{channel}_{plane:06}.ome.tif")
}

/// Bruker folder of `channels` x `cycles` x `planes` flat planes.
pub fn bruker_folder(root: &Path, name: &str, channels: &[u32], cycles: u32, planes: u32) -> PathBuf {
    let folder = root.join(name);
    fs::create_dir_all(&folder).unwrap();
    for &c in channels {
        for t in 1..=cycles {
            for z in 1..=planes {
                write_tiff_u16(&folder.join(bruker_name(t, c, z)), W, H, &[flat(code(c, t, z))]);
            }
        }
    }
    folder
}

pub fn olympus_name(channel: u32, z: Option<u32>, t: Option<u32>) -> String {
    let mut name = format!("s_C{channel:03}");
    if let Some(z) = z {
        name.push_str(&format!("Z{z:03}"));
    }
    if let Some(t) = t {
        name.push_str(&format!("T{t:03}"));
    }
    name.push_str(".tif");
    name
}

pub fn flamingo_name(t: u32, channel: u32, side: u32, planes: u32) -> String {
    format!("S000_t{t:06}_V000_R0000_X000_Y000_C{channel:02}_I{side}_D0_P{planes:05}.tif")
}

/// Flamingo folder: one `planes`-deep stack per (timepoint, channel, side).
///
/// Side `s` of (c, t) holds `code(c, t, z) + s` at every pixel of plane z.
pub fn flamingo_folder(
    root: &Path,
    name: &str,
    channels: &[u32],
    timepoints: u32,
    sides: u32,
    planes: u32,
) -> PathBuf {
    let folder = root.join(name);
    fs::create_dir_all(&folder).unwrap();
    for t in 0..timepoints {
        for &c in channels {
            for s in 0..sides {
                let pages: Vec<Vec<u16>> = (0..planes).map(|z| flat(code(c, t, z) + s as u16)).collect();
                write_tiff_u16(&folder.join(flamingo_name(t, c, s, planes)), W, H, &pages);
            }
        }
    }
    folder
}

/// Default config without metadata extraction.
pub fn config() -> ConversionConfig {
    ConversionConfig {
        extract_metadata: false,
        ..ConversionConfig::default()
    }
}

/// Minimal PrairieView XML with `cycles` cycles of `absoluteTime` step `dt`.
pub fn bruker_xml(cycles: u32, dt: f64) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?>
<PVScan version="5.8.64.100">
  <PVStateShard>
    <PVStateValue key="bitDepth" value="13" />
    <PVStateValue key="dwellTime" value="2" />
    <PVStateValue key="heliosNDFilter">
      <IndexedValue index="0" value="1" description="ND 1.0" />
      <IndexedValue index="1" value="0" description="Open" />
    </PVStateValue>
    <PVStateValue key="laserPower">
      <IndexedValue index="0" value="25" description="Imaging" />
      <IndexedValue index="1" value="5" description="Uncaging" />
    </PVStateValue>
    <PVStateValue key="micronsPerPixel">
      <IndexedValue index="XAxis" value="0.5" />
      <IndexedValue index="YAxis" value="0.5" />
      <IndexedValue index="ZAxis" value="2" />
    </PVStateValue>
    <PVStateValue key="objectiveLens" value="Nikon 16X" />
  </PVStateShard>
"#,
    );
    for cycle in 1..=cycles {
        xml.push_str(&format!(
            "  <Sequence type=\"TSeries\" cycle=\"{cycle}\">\n    <Frame relativeTime=\"0\" absoluteTime=\"{}\" index=\"1\">\n      <File channel=\"1\" channelName=\"Ch1\" page=\"1\" filename=\"{}\" />\n    </Frame>\n  </Sequence>\n",
            cycle as f64 * dt,
            bruker_name(cycle, 1, 1)
        ));
    }
    xml.push_str("</PVScan>\n");
    xml
}
