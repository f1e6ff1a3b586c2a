mod common;

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use tempfile::TempDir;

use scopestack_core::assemble::AxisOrder;
use scopestack_core::classify::AcquisitionType;
use scopestack_core::coords::Instrument;
use scopestack_core::error::ScopeError;
use scopestack_core::io::imagej::ImageJTiffWriter;
use scopestack_core::organize::ChannelId;
use scopestack_core::pipeline::config::ConversionConfig;
use scopestack_core::pipeline::{
    archive_folders, discover_folders, run_batch, run_folders, CancelToken, FolderOutcome,
    FolderSummary, NoOpReporter, PipelineStage, ProgressReporter, RunLog,
};
use scopestack_core::pipeline::folder::list_files;
use scopestack_core::stack::projection::Projection;

use common::{
    bruker_folder, bruker_name, bruker_xml, code, config, flamingo_folder, flamingo_name, flat,
    olympus_name, read_description, read_pages_u16, write_tiff_u16, H, W,
};

fn run(root: &Path, config: &ConversionConfig) -> (Vec<FolderSummary>, RunLog) {
    let mut log = RunLog::new();
    let summaries = run_batch(
        root,
        config,
        &ImageJTiffWriter,
        &NoOpReporter,
        &CancelToken::new(),
        &mut log,
    )
    .unwrap();
    (summaries, log)
}

fn output_dir(root: &Path) -> std::path::PathBuf {
    root.join("!processed_images")
}

// ---------------------------------------------------------------------------
// Bruker
// ---------------------------------------------------------------------------

#[test]
fn test_bruker_single_timepoint_max_projection() {
    let root = TempDir::new().unwrap();
    let folder = bruker_folder(root.path(), "zstack", &[1, 2, 3, 4], 1, 5);
    fs::write(folder.join("zstack.xml"), bruker_xml(1, 2.0)).unwrap();

    let cfg = ConversionConfig {
        projection: Projection::Max,
        ..ConversionConfig::default()
    };
    let (summaries, log) = run(root.path(), &cfg);
    assert_eq!(log.processed(), &["zstack".to_string()]);

    let s = &summaries[0];
    assert_eq!(s.instrument, Instrument::Bruker);
    assert_eq!(s.acquisition, AcquisitionType::MultiPlaneSingleTimepoint);
    assert_eq!(s.axes, AxisOrder::Tcyx);
    assert_eq!(s.shape, vec![1, 4, H, W]);
    assert_eq!(s.output, output_dir(root.path()).join("MAX_zstack_raw.tif"));

    // One page per channel, each the brightest plane.
    let pages = read_pages_u16(&s.output);
    let firsts: Vec<u16> = pages.iter().map(|p| p[0]).collect();
    assert_eq!(firsts, (1..=4).map(|c| code(c, 1, 5)).collect::<Vec<_>>());

    let d = read_description(&s.output);
    assert!(d.contains("channels=4\n"));
    assert!(d.contains("finterval=2\n"));
    assert!(d.contains("spacing=2\n"));
    assert_eq!(s.metadata.as_ref().unwrap().x_microns_per_pixel, Some(0.5));
}

#[test]
fn test_bruker_single_plane_series() {
    let root = TempDir::new().unwrap();
    let folder = bruker_folder(root.path(), "movie", &[1, 2], 10, 1);
    fs::write(folder.join("movie.xml"), bruker_xml(1, 5.0)).unwrap();

    let cfg = ConversionConfig {
        single_plane: true,
        ..ConversionConfig::default()
    };
    let (summaries, _) = run(root.path(), &cfg);
    let s = &summaries[0];
    assert_eq!(s.acquisition, AcquisitionType::SinglePlaneMultiFrame);
    assert_eq!(s.axes, AxisOrder::Tzcyx);
    assert_eq!(s.shape, vec![10, 1, 2, H, W]);
    assert_eq!(s.output, output_dir(root.path()).join("movie_raw.tif"));
    // Series duration spread over the frames.
    assert_eq!(s.metadata.as_ref().unwrap().framerate, Some(0.5));

    let pages = read_pages_u16(&s.output);
    assert_eq!(pages.len(), 20);
    assert_eq!(pages[0][0], code(1, 1, 1));
    assert_eq!(pages[1][0], code(2, 1, 1));
    assert_eq!(pages[19][0], code(2, 10, 1));
}

#[test]
fn test_bruker_multi_timepoint_without_projection() {
    let root = TempDir::new().unwrap();
    bruker_folder(root.path(), "timelapse", &[1, 2], 3, 4);

    let (summaries, log) = run(root.path(), &config());
    let s = &summaries[0];
    assert_eq!(s.acquisition, AcquisitionType::MultiPlaneMultiTimepoint);
    assert_eq!(s.shape, vec![3, 4, 2, H, W]);
    assert!(log
        .notes()
        .contains(&"Skipping metadata extraction timelapse.".to_string()));

    let pages = read_pages_u16(&s.output);
    // (t, z, c) = (2, 3, 1) in zero-based page order.
    assert_eq!(pages[(2 * 4 + 3) * 2 + 1][0], code(2, 3, 4));
}

#[test]
fn test_unequal_channels_truncated_to_shortest() {
    let root = TempDir::new().unwrap();
    let folder = bruker_folder(root.path(), "uneven", &[1, 2], 1, 3);
    fs::remove_file(folder.join(bruker_name(1, 2, 3))).unwrap();

    let (summaries, log) = run(root.path(), &config());
    let s = &summaries[0];
    assert_eq!(s.shape, vec![1, 2, 2, H, W]);
    assert_eq!(s.dropped_files, 1);
    assert!(log.notes().iter().any(|n| n.contains("truncated 1 file")));
}

#[test]
fn test_channel_order_from_config() {
    let root = TempDir::new().unwrap();
    bruker_folder(root.path(), "ordered", &[1, 2], 1, 2);

    let cfg = ConversionConfig {
        channel_order: Some(vec![2, 1]),
        ..config()
    };
    let (summaries, _) = run(root.path(), &cfg);
    let s = &summaries[0];
    assert_eq!(s.channels, vec![ChannelId(2), ChannelId(1)]);
    let pages = read_pages_u16(&s.output);
    assert_eq!(pages[0][0], code(2, 1, 1));
}

// ---------------------------------------------------------------------------
// Flamingo and Olympus
// ---------------------------------------------------------------------------

#[test]
fn test_flamingo_sides_merged_and_rotated() {
    let root = TempDir::new().unwrap();
    flamingo_folder(root.path(), "lightsheet", &[0, 1], 3, 2, 4);

    let cfg = ConversionConfig {
        projection: Projection::Mean,
        ..config()
    };
    let (summaries, _) = run(root.path(), &cfg);
    let s = &summaries[0];
    assert_eq!(s.instrument, Instrument::Flamingo);
    assert_eq!(s.acquisition, AcquisitionType::MultiPlaneMultiTimepoint);
    assert_eq!(s.illumination_merges, 6);
    assert_eq!(s.axes, AxisOrder::Tcyx);
    // Rotation swaps the plane axes.
    assert_eq!(s.shape, vec![3, 2, W, H]);
    assert_eq!(s.output, output_dir(root.path()).join("AVG_lightsheet_raw.tif"));

    // Brighter side wins; mean of z = 0..4 rounds (base + 1) + 1.5 up.
    let pages = read_pages_u16(&s.output);
    assert_eq!(pages.len(), 6);
    assert_eq!(pages[0][0], code(0, 0, 3));
    assert_eq!(pages[5][0], code(1, 2, 3));
    assert!(pages.iter().all(|p| p.len() == W * H));
}

#[test]
fn test_flamingo_full_stacks_without_projection() {
    let root = TempDir::new().unwrap();
    flamingo_folder(root.path(), "sheet", &[0], 1, 2, 3);

    let (summaries, _) = run(root.path(), &config());
    let s = &summaries[0];
    assert_eq!(s.acquisition, AcquisitionType::MultiPlaneSingleTimepoint);
    assert_eq!(s.shape, vec![1, 3, 1, W, H]);
    assert_eq!(s.illumination_merges, 1);
}

#[test]
fn test_flamingo_missing_side_mid_series_fails_folder() {
    let root = TempDir::new().unwrap();
    let folder = flamingo_folder(root.path(), "ls", &[0, 1], 2, 2, 3);
    fs::remove_file(folder.join(flamingo_name(0, 0, 1, 3))).unwrap();

    let cfg = ConversionConfig {
        projection: Projection::Max,
        ..config()
    };
    let (summaries, log) = run(root.path(), &cfg);
    assert!(summaries.is_empty());
    assert!(log.processed().is_empty());
    assert_eq!(log.failed()[0].0, "ls");
    assert!(log.failed()[0].1.contains("illumination sides"));
    assert!(!output_dir(root.path()).join("MAX_ls_raw.tif").exists());
}

#[test]
fn test_flamingo_missing_side_in_last_timepoint_drops_it() {
    let root = TempDir::new().unwrap();
    let folder = flamingo_folder(root.path(), "ls", &[0, 1], 2, 2, 3);
    fs::remove_file(folder.join(flamingo_name(1, 0, 1, 3))).unwrap();

    let cfg = ConversionConfig {
        projection: Projection::Max,
        ..config()
    };
    let (summaries, log) = run(root.path(), &cfg);
    let s = &summaries[0];
    assert_eq!(s.shape, vec![1, 2, W, H]);
    assert_eq!(s.illumination_merges, 2);
    assert_eq!(s.dropped_files, 3);
    assert!(log.notes().iter().any(|n| n.contains("dropped 3 file(s)")));

    // Both channels keep both sides: the brighter side 1 wins.
    let pages = read_pages_u16(&s.output);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0][0], code(0, 0, 2) + 1);
    assert_eq!(pages[1][0], code(1, 0, 2) + 1);
}

#[test]
fn test_olympus_folder_suffix_dropped_from_output() {
    let root = TempDir::new().unwrap();
    let folder = root.path().join("cells.oif.files");
    fs::create_dir_all(&folder).unwrap();
    for c in 1..=2 {
        for z in 1..=3 {
            write_tiff_u16(&folder.join(olympus_name(c, Some(z), None)), W, H, &[flat(code(c, 0, z))]);
        }
    }
    // Reference image, never a plane.
    write_tiff_u16(&folder.join("s_C001-R001.tif"), W, H, &[flat(0)]);

    let (summaries, _) = run(root.path(), &config());
    let s = &summaries[0];
    assert_eq!(s.instrument, Instrument::Olympus);
    assert_eq!(s.shape, vec![1, 3, 2, H, W]);
    assert_eq!(s.output, output_dir(root.path()).join("cells_raw.tif"));
}

// ---------------------------------------------------------------------------
// Run behaviour
// ---------------------------------------------------------------------------

#[test]
fn test_existing_output_is_skipped() {
    let root = TempDir::new().unwrap();
    bruker_folder(root.path(), "again", &[1], 1, 2);

    let (first, _) = run(root.path(), &config());
    assert_eq!(first.len(), 1);
    let before = fs::metadata(&first[0].output).unwrap().modified().unwrap();

    let (second, log) = run(root.path(), &config());
    assert!(second.is_empty());
    assert_eq!(log.already_exists(), &["again".to_string()]);
    assert!(log.failed().is_empty());
    assert_eq!(fs::metadata(&first[0].output).unwrap().modified().unwrap(), before);
}

#[test]
fn test_existing_output_skipped_before_reading_planes() {
    let root = TempDir::new().unwrap();
    let folder = bruker_folder(root.path(), "again", &[1], 1, 2);
    run(root.path(), &config());

    fs::write(folder.join(bruker_name(1, 1, 1)), b"not a tiff").unwrap();
    let (second, log) = run(root.path(), &config());
    assert!(second.is_empty());
    assert_eq!(log.already_exists(), &["again".to_string()]);
    assert!(log.failed().is_empty());
}

#[cfg(unix)]
#[test]
fn test_list_files_skips_non_utf8_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("b.tif"), b"").unwrap();
    fs::write(dir.path().join("a.tif"), b"").unwrap();
    fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.tif")), b"").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    assert_eq!(list_files(dir.path()).unwrap(), vec!["a.tif", "b.tif"]);
}

#[test]
fn test_failed_folder_does_not_stop_the_run() {
    let root = TempDir::new().unwrap();
    let empty = root.path().join("a_empty");
    fs::create_dir_all(&empty).unwrap();
    fs::write(empty.join("notes.txt"), "nothing here").unwrap();
    bruker_folder(root.path(), "b_good", &[1], 1, 2);

    let (summaries, log) = run(root.path(), &config());
    assert_eq!(summaries.len(), 1);
    assert_eq!(log.processed(), &["b_good".to_string()]);
    assert_eq!(log.failed().len(), 1);
    assert_eq!(log.failed()[0].0, "a_empty");
    assert!(log.elapsed().is_some());
    assert!(!output_dir(root.path()).join("a_empty_raw.tif").exists());
}

#[test]
fn test_missing_bruker_xml_fails_folder_when_extracting() {
    let root = TempDir::new().unwrap();
    bruker_folder(root.path(), "noxml", &[1], 1, 2);

    let (summaries, log) = run(root.path(), &ConversionConfig::default());
    assert!(summaries.is_empty());
    assert_eq!(log.failed()[0].0, "noxml");
}

#[test]
fn test_cancelled_run_stops_with_log_intact() {
    let root = TempDir::new().unwrap();
    bruker_folder(root.path(), "one", &[1], 1, 2);

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut log = RunLog::new();
    let err = run_batch(
        root.path(),
        &config(),
        &ImageJTiffWriter,
        &NoOpReporter,
        &cancel,
        &mut log,
    )
    .unwrap_err();
    assert!(matches!(err, ScopeError::Cancelled));
    assert!(log.processed().is_empty());
}

#[test]
fn test_bookkeeping_folders_not_discovered() {
    let root = TempDir::new().unwrap();
    bruker_folder(root.path(), "b", &[1], 1, 1);
    bruker_folder(root.path(), "a", &[1], 1, 1);
    fs::create_dir_all(root.path().join("!processed_images")).unwrap();
    fs::write(root.path().join("loose.tif"), b"").unwrap();

    let names: Vec<String> = discover_folders(root.path())
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_run_selected_folders_and_archive() {
    let root = TempDir::new().unwrap();
    let a = bruker_folder(root.path(), "a", &[1], 1, 2);
    bruker_folder(root.path(), "b", &[1], 1, 2);

    let mut log = RunLog::new();
    let summaries = run_folders(
        root.path(),
        &[a.clone()],
        &config(),
        &ImageJTiffWriter,
        &NoOpReporter,
        &CancelToken::new(),
        &mut log,
    )
    .unwrap();
    assert_eq!(summaries.len(), 1);
    assert!(!output_dir(root.path()).join("b_raw.tif").exists());

    let processed = log.processed().to_vec();
    let moved = archive_folders(root.path(), &processed, &mut log).unwrap();
    assert_eq!(moved, vec![root.path().join("!scope_folders").join("a")]);
    assert!(!a.exists());
    assert!(moved[0].is_dir());
}

#[test]
fn test_archive_continues_past_a_failed_move() {
    let root = TempDir::new().unwrap();
    let a = bruker_folder(root.path(), "a", &[1], 1, 1);

    let mut log = RunLog::new();
    let names = vec!["ghost".to_string(), "a".to_string()];
    let moved = archive_folders(root.path(), &names, &mut log).unwrap();
    assert_eq!(moved, vec![root.path().join("!scope_folders").join("a")]);
    assert!(!a.exists());
    assert_eq!(log.issues().len(), 1);
    assert!(log.issues()[0].starts_with("ghost: not archived"));
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ProgressReporter for Recorder {
    fn begin_folder(&self, name: &str) {
        self.events.lock().unwrap().push(format!("folder {name}"));
    }

    fn begin_stage(&self, stage: PipelineStage, _total: Option<usize>) {
        self.events.lock().unwrap().push(stage.to_string());
    }

    fn finish_folder(&self, name: &str, outcome: Result<&FolderOutcome, &str>) {
        let tag = if outcome.is_ok() { "ok" } else { "failed" };
        self.events.lock().unwrap().push(format!("{tag} {name}"));
    }
}

#[test]
fn test_reporter_sees_stages_in_order() {
    let root = TempDir::new().unwrap();
    bruker_folder(root.path(), "watched", &[1], 1, 2);

    let recorder = Recorder::default();
    let mut log = RunLog::new();
    run_batch(
        root.path(),
        &config(),
        &ImageJTiffWriter,
        &recorder,
        &CancelToken::new(),
        &mut log,
    )
    .unwrap();

    let events = recorder.events.into_inner().unwrap();
    assert_eq!(
        events,
        vec![
            "folder watched",
            "Classifying",
            "Loading planes",
            "Assembling hyperstack",
            "Writing output",
            "ok watched",
        ]
    );
}
