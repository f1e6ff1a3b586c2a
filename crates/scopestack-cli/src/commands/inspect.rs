use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use scopestack_core::assemble::layout_for;
use scopestack_core::classify::{classify, ClassifyRequest, FolderListing};
use scopestack_core::coords::FilenameGrammar;
use scopestack_core::io::plane_io::probe_plane;
use scopestack_core::organize::{extract_sources, ChannelGroups};
use scopestack_core::pipeline::config::ConversionConfig;
use scopestack_core::pipeline::folder::list_files;
use scopestack_core::pipeline::output_path;

use super::convert::AcquisitionArgs;
use crate::summary::{print_inspection, Inspection};

#[derive(Args)]
pub struct InspectArgs {
    /// Acquisition folder
    pub folder: PathBuf,

    #[command(flatten)]
    pub acquisition: AcquisitionArgs,
}

/// Classify a folder and show the hyperstack it would become.
pub fn run(args: &InspectArgs) -> Result<()> {
    let mut config = ConversionConfig::default();
    args.acquisition.apply(&mut config);

    let folder = &args.folder;
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Bad folder path {}", folder.display()))?;
    let names = list_files(folder)
        .with_context(|| format!("Failed to list {}", folder.display()))?;

    let instrument = config.instrument.resolve(&name, &names)?;
    let grammar = FilenameGrammar::new(instrument)?;
    let mut sources = extract_sources(&grammar, folder, &names)?;
    if sources.is_empty() {
        bail!("No {instrument} image files in {}", folder.display());
    }
    sources.sort_by(|a, b| a.name.cmp(&b.name));

    let plane = probe_plane(&sources[0].path)?;
    let classification = classify(
        &FolderListing {
            instrument,
            sources: &sources,
            planes_per_file: plane.depth,
        },
        ClassifyRequest {
            projection: config.projection,
            single_plane: config.single_plane,
        },
    )?;

    let groups = ChannelGroups::organize(sources)?;
    let output = output_path(
        folder,
        classification.projection.output_prefix(),
        &instrument.output_stem(&name),
    );
    let output_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    print_inspection(&Inspection {
        folder,
        instrument,
        plane,
        classification,
        files_per_channel: &groups.files_per_channel(),
        layout: layout_for(classification.acquisition, classification.projection),
        output_name: &output_name,
    });
    Ok(())
}
