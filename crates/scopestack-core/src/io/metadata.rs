//! Acquisition metadata sidecars.
//!
//! Only Bruker folders carry a sidecar the converter understands (the
//! PrairieView `.xml`). It is scanned with regular expressions rather than
//! a full XML parser: PrairieView writes a handful of elements that are not
//! well-formed XML, and only a few attributes are needed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::coords::Instrument;
use crate::error::{Result, ScopeError};

/// Physical calibration and descriptive values of one acquisition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AcquisitionMetadata {
    /// Frame interval in seconds (ImageJ `finterval`).
    pub framerate: Option<f64>,
    pub x_microns_per_pixel: Option<f64>,
    pub y_microns_per_pixel: Option<f64>,
    pub z_microns_per_pixel: Option<f64>,
    /// Instrument-descriptive values carried through verbatim, as
    /// (column name, value) pairs in a stable order.
    pub passthrough: Vec<(String, String)>,
}

impl AcquisitionMetadata {
    /// Single-plane series report the whole series duration per cycle; the
    /// per-frame interval is that divided by the frame count.
    pub fn per_frame(mut self, frames: usize) -> Self {
        if frames > 0 {
            self.framerate = self.framerate.map(|f| f / frames as f64);
        }
        self
    }
}

/// Extracted metadata plus non-fatal problems found on the way.
#[derive(Clone, Debug, Default)]
pub struct MetadataReport {
    pub metadata: AcquisitionMetadata,
    pub issues: Vec<String>,
}

/// Supplier of [`AcquisitionMetadata`] for an acquisition folder.
pub trait MetadataSource {
    /// `Ok(None)` when this instrument has no metadata to offer.
    fn extract(&self, folder: &Path) -> Result<Option<MetadataReport>>;
}

/// Source for instruments without a supported sidecar.
pub struct NoMetadata;

impl MetadataSource for NoMetadata {
    fn extract(&self, _folder: &Path) -> Result<Option<MetadataReport>> {
        Ok(None)
    }
}

/// Metadata source matching the instrument.
pub fn metadata_source(instrument: Instrument) -> Result<Box<dyn MetadataSource>> {
    Ok(match instrument {
        Instrument::Bruker => Box::new(BrukerXmlMetadata::new()?),
        Instrument::Olympus | Instrument::Flamingo => Box::new(NoMetadata),
    })
}

/// PrairieView `.xml` sidecar reader.
pub struct BrukerXmlMetadata {
    frame: Regex,
    file: Regex,
    attr: Regex,
    indexed: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ScopeError::Internal(format!("invalid pattern {pattern}: {e}")))
}

const ND_FILTER_COLUMNS: [&str; 2] = ["imaging light path", "PA light path"];

impl BrukerXmlMetadata {
    pub fn new() -> Result<Self> {
        Ok(Self {
            frame: compile(r"(?s)<Frame\b([^>]*)>(.*?)</Frame>")?,
            file: compile(r"<File\b([^>]*?)/?>")?,
            attr: compile(r#"(\w+)="([^"]*)""#)?,
            indexed: compile(r"<IndexedValue\b([^>]*?)/?>")?,
        })
    }

    /// First `.xml` file of `folder`, in name order.
    pub fn locate(folder: &Path) -> Result<PathBuf> {
        let mut xml: Vec<PathBuf> = fs::read_dir(folder)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "xml"))
            .collect();
        xml.sort();
        xml.into_iter().next().ok_or_else(|| {
            ScopeError::MissingInput(format!("no XML file found in {}", folder.display()))
        })
    }

    fn attributes(&self, text: &str) -> BTreeMap<String, String> {
        self.attr
            .captures_iter(text)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect()
    }

    /// `value` attribute of `<PVStateValue key="{key}" value=".."/>`.
    fn state_value(&self, xml: &str, key: &str) -> Result<Option<String>> {
        let re = compile(&format!(
            r#"<PVStateValue\b[^>]*\bkey="{}"[^>]*>"#,
            regex::escape(key)
        ))?;
        Ok(re
            .find(xml)
            .and_then(|m| self.attributes(m.as_str()).remove("value")))
    }

    /// Attributes of each `<IndexedValue>` under `<PVStateValue key="{key}">`.
    fn indexed_values(&self, xml: &str, key: &str) -> Result<Option<Vec<BTreeMap<String, String>>>> {
        let re = compile(&format!(
            r#"(?s)<PVStateValue\b[^>]*\bkey="{}"[^>]*>(.*?)</PVStateValue>"#,
            regex::escape(key)
        ))?;
        Ok(re.captures(xml).map(|c| {
            self.indexed
                .captures_iter(&c[1])
                .map(|iv| self.attributes(&iv[1]))
                .collect()
        }))
    }

    /// Frame interval: absolute time of the last cycle's first plane divided
    /// by the number of cycles.
    fn frame_interval(&self, xml: &str) -> Option<f64> {
        let mut first_planes: BTreeMap<u32, f64> = BTreeMap::new();
        for frame in self.frame.captures_iter(xml) {
            let attrs = self.attributes(&frame[1]);
            let Some(time) = attrs.get("absoluteTime").and_then(|t| t.parse::<f64>().ok()) else {
                continue;
            };
            for file in self.file.captures_iter(&frame[2]) {
                let Some(name) = self.attributes(&file[1]).remove("filename") else {
                    continue;
                };
                if !name.contains("000001.ome.tif") {
                    continue;
                }
                if let Some(cycle) = cycle_of(&name) {
                    first_planes.insert(cycle, time);
                }
            }
        }
        let (_, &last) = first_planes.iter().next_back()?;
        Some(last / first_planes.len() as f64)
    }

    pub fn parse(&self, xml: &str) -> Result<MetadataReport> {
        let mut report = MetadataReport::default();
        let md = &mut report.metadata;

        let microns = self
            .indexed_values(xml, "micronsPerPixel")?
            .ok_or_else(|| ScopeError::Metadata("micronsPerPixel not found".into()))?;
        for entry in microns {
            let value = entry.get("value").and_then(|v| v.parse::<f64>().ok());
            match entry.get("index").map(String::as_str) {
                Some("XAxis") => md.x_microns_per_pixel = value,
                Some("YAxis") => md.y_microns_per_pixel = value,
                Some("ZAxis") => md.z_microns_per_pixel = value,
                _ => {}
            }
        }

        md.framerate = self.frame_interval(xml);
        if md.framerate.is_none() {
            report.issues.push("Frame timing not found in the XML.".into());
        }

        for (key, column) in [
            ("bitDepth", "Bit Depth"),
            ("dwellTime", "Dwell Time"),
            ("objectiveLens", "Objective Lens Description"),
        ] {
            match self.state_value(xml, key)? {
                Some(v) => md.passthrough.push((column.to_string(), v)),
                None => report.issues.push(format!("{column} not found in the XML.")),
            }
        }

        match self.indexed_values(xml, "laserPower")? {
            Some(lasers) => {
                for laser in lasers {
                    let description = laser.get("description").cloned().unwrap_or_default();
                    let value = laser.get("value").cloned().unwrap_or_default();
                    md.passthrough.push((format!("{description} power"), value));
                }
            }
            None => report.issues.push("Laser Power values not found in the XML.".into()),
        }

        match self.indexed_values(xml, "heliosNDFilter")? {
            Some(filters) => {
                for (i, filter) in filters.iter().enumerate() {
                    let column = ND_FILTER_COLUMNS
                        .get(i)
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| format!("ND filter {i}"));
                    let description = filter.get("description").cloned().unwrap_or_default();
                    md.passthrough.push((column, description));
                }
            }
            None => report
                .issues
                .push("Helios ND Filter values not found in the XML.".into()),
        }

        for issue in &report.issues {
            warn!("{issue}");
        }
        Ok(report)
    }
}

impl MetadataSource for BrukerXmlMetadata {
    fn extract(&self, folder: &Path) -> Result<Option<MetadataReport>> {
        let path = Self::locate(folder)?;
        debug!(path = %path.display(), "Reading Bruker metadata");
        let xml = fs::read_to_string(&path)?;
        self.parse(&xml).map(Some)
    }
}

/// Cycle number of a Bruker file name (`..._Cycle00012_Ch2_000001.ome.tif`).
fn cycle_of(filename: &str) -> Option<u32> {
    let tokens: Vec<&str> = filename.split('_').collect();
    let token = tokens.get(tokens.len().checked_sub(3)?)?;
    token.strip_prefix("Cycle")?.parse().ok()
}
