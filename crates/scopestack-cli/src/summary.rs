use std::path::Path;

use console::Style;
use scopestack_core::assemble::{AxisOrder, SourceLayout};
use scopestack_core::classify::Classification;
use scopestack_core::coords::Instrument;
use scopestack_core::organize::ChannelId;
use scopestack_core::pipeline::config::ConversionConfig;
use scopestack_core::pipeline::{FolderSummary, RunLog};
use scopestack_core::plane::PlaneInfo;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    warn: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            warn: Style::new().red(),
        }
    }
}

fn rule(s: &Styles, width: usize) {
    println!("  {}", s.title.apply_to("\u{2550}".repeat(width)));
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_conversion_plan(root: &Path, config: &ConversionConfig, folders: usize) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Scopestack Conversion"));
    rule(&s, 21);
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Root"),
        s.path.apply_to(root.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(root.join(&config.output_dir_name).display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Folders"),
        s.value.apply_to(folders)
    );
    println!();

    println!("  {}", s.header.apply_to("Acquisition"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Instrument"),
        s.method.apply_to(format!("{:?}", config.instrument).to_lowercase())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Projection"),
        s.method.apply_to(config.projection)
    );
    if config.single_plane {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Planes"),
            s.value.apply_to("single")
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Output"));
    match &config.channel_order {
        Some(order) => println!(
            "    {:<12}{}",
            s.label.apply_to("Channels"),
            s.value.apply_to(join(order))
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Channels"),
            s.disabled.apply_to("ascending")
        ),
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("LUTs"),
        s.value.apply_to(join(&config.luts))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Metadata"),
        if config.extract_metadata {
            s.method.apply_to("extract")
        } else {
            s.disabled.apply_to("skipped")
        }
    );
    if config.archive_sources {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Archive"),
            s.value.apply_to("move converted folders")
        );
    }
    println!();
}

pub fn print_run_summary(summaries: &[FolderSummary], log: &RunLog, log_path: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Run Summary"));
    rule(&s, 11);
    println!();

    for summary in summaries {
        println!("  {}", s.header.apply_to(&summary.folder));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Type"),
            s.method.apply_to(summary.acquisition)
        );
        println!(
            "    {:<12}{} {:?} {}",
            s.label.apply_to("Shape"),
            s.value.apply_to(summary.axes),
            summary.shape,
            s.label.apply_to(summary.pixel_type)
        );
        if summary.illumination_merges > 0 {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Merges"),
                s.value.apply_to(summary.illumination_merges)
            );
        }
        if summary.dropped_files > 0 {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Dropped"),
                s.warn.apply_to(format!("{} file(s)", summary.dropped_files))
            );
        }
        println!(
            "    {:<12}{}",
            s.label.apply_to("Output"),
            s.path.apply_to(summary.output.display())
        );
    }
    if !summaries.is_empty() {
        println!();
    }

    println!(
        "  {:<14}{}",
        s.label.apply_to("Converted"),
        s.value.apply_to(log.processed().len())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Existing"),
        s.disabled.apply_to(log.already_exists().len())
    );
    if log.failed().is_empty() {
        println!("  {:<14}{}", s.label.apply_to("Failed"), s.value.apply_to(0));
    } else {
        println!("  {}", s.warn.apply_to("Failed"));
        for (folder, reason) in log.failed() {
            println!("    {:<12}{}", s.label.apply_to(folder), reason);
        }
    }
    if let Some(elapsed) = log.elapsed() {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Elapsed"),
            s.value.apply_to(format!("{:.1} s", elapsed.as_secs_f64()))
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Log"),
        s.path.apply_to(log_path.display())
    );
    println!();
}

/// What `inspect` found out about one folder.
pub struct Inspection<'a> {
    pub folder: &'a Path,
    pub instrument: Instrument,
    pub plane: PlaneInfo,
    pub classification: Classification,
    pub files_per_channel: &'a [(ChannelId, usize)],
    pub layout: (SourceLayout, AxisOrder),
    pub output_name: &'a str,
}

pub fn print_inspection(inspection: &Inspection<'_>) {
    let s = Styles::new();
    let Inspection {
        folder,
        instrument,
        plane,
        classification,
        files_per_channel,
        layout,
        output_name,
    } = inspection;

    println!();
    println!("  {}", s.title.apply_to("Folder Inspection"));
    rule(&s, 17);
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Folder"),
        s.path.apply_to(folder.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Instrument"),
        s.method.apply_to(instrument)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Planes"),
        s.value.apply_to(format!(
            "{}x{} {}, {} page(s) per file",
            plane.width, plane.height, plane.pixel_type, plane.depth
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Channels"));
    for (id, files) in files_per_channel.iter() {
        println!(
            "    {:<12}{}",
            s.label.apply_to(id),
            s.value.apply_to(format!("{files} file(s)"))
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Classification"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Type"),
        s.method.apply_to(classification.acquisition)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Projection"),
        s.method.apply_to(classification.projection)
    );
    println!(
        "    {:<12}{} -> {}",
        s.label.apply_to("Axes"),
        s.value.apply_to(layout.0.as_str()),
        s.value.apply_to(layout.1)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output_name)
    );
    println!();
}
