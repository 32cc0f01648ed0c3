//! Batch normalization of STL directories
//!
//! Every STL file found in a directory is read, cleaned, decimated when it
//! exceeds the face budget and written back as binary STL. A failing file is
//! reported and skipped; the rest of the batch still runs.

pub mod batch;

pub use batch::{
    discover_stl_files, output_path, process_file, run_batch, BatchSummary, DirectoryScan,
    FileReport, NormalizeOptions, DEFAULT_MAX_FACES, DEFAULT_SUFFIX,
};
