/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Cycle token carried by every file of a single-timepoint Bruker acquisition.
pub const BRUKER_FIRST_CYCLE: &str = "Cycle00001";

/// Position of the cycle token counted from the end of a `_`-split Bruker filename.
pub const BRUKER_CYCLE_TOKEN_FROM_END: usize = 3;

/// Olympus reference/thumbnail files that never hold acquisition planes.
pub const OLYMPUS_EXCLUDED_MARKERS: [&str; 4] = ["-R001", "-R002", "-R003", "-R004"];

/// Suffix of Olympus acquisition folders, stripped from output names.
pub const OLYMPUS_FOLDER_SUFFIX: &str = ".oif.files";

/// Output directory created under the dataset root.
pub const PROCESSED_DIR_NAME: &str = "!processed_images";

/// Archive directory for converted source folders.
pub const ARCHIVE_DIR_NAME: &str = "!scope_folders";

/// Run log file name inside the output directory.
pub const RUN_LOG_FILE_NAME: &str = "!image_conversion_log.txt";

/// Metadata CSV file name inside the output directory.
pub const METADATA_CSV_FILE_NAME: &str = "!image_metadata.csv";

/// Folder names starting with this are bookkeeping, not acquisitions.
pub const BOOKKEEPING_PREFIX: char = '!';

/// Number of entries in a display look-up table.
pub const LUT_SIZE: usize = 256;

/// TIFF tag holding ImageJ binary metadata (LUTs).
pub const IJ_METADATA_TAG: u16 = 50839;

/// TIFF tag holding byte counts of the ImageJ metadata blocks.
pub const IJ_METADATA_BYTE_COUNTS_TAG: u16 = 50838;

/// Hyperstack size above which a slow-write warning is logged. Default: 1 GiB.
pub const LARGE_HYPERSTACK_BYTES: usize = 1_073_741_824;
