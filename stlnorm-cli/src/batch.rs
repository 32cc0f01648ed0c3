//! Directory walk and per-file normalization

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use stlnorm_core::{Error, Result};
use stlnorm_io::{is_stl_path, read_stl_with_encoding, write_mesh, StlEncoding};
use stlnorm_simplification::{MeshSimplifier, QuadricDecimator};

/// Face budget applied when none is given
pub const DEFAULT_MAX_FACES: usize = 150_000;

/// Appended to the file stem when originals are kept
pub const DEFAULT_SUFFIX: &str = "_fixed";

/// Settings for one batch run
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Directory scanned for STL files
    pub target_dir: PathBuf,
    /// Meshes with more faces than this are decimated down to it
    pub max_faces: usize,
    /// Replace each input in place instead of writing a suffixed sibling
    pub overwrite: bool,
    pub suffix: String,
    /// Descend into subdirectories
    pub recursive: bool,
    pub preserve_boundary: bool,
    pub preserve_normal: bool,
    /// Run every step except the final write
    pub dry_run: bool,
}

impl NormalizeOptions {
    /// Default settings for `target_dir`
    pub fn new<P: Into<PathBuf>>(target_dir: P) -> Self {
        Self {
            target_dir: target_dir.into(),
            max_faces: DEFAULT_MAX_FACES,
            overwrite: true,
            suffix: DEFAULT_SUFFIX.to_string(),
            recursive: false,
            preserve_boundary: true,
            preserve_normal: true,
            dry_run: false,
        }
    }

    /// Default settings for the process working directory
    pub fn for_current_dir() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    fn decimator(&self) -> QuadricDecimator {
        QuadricDecimator {
            preserve_boundary: self.preserve_boundary,
            preserve_normal: self.preserve_normal,
            ..QuadricDecimator::default()
        }
    }
}

/// What happened to a single file
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub source_encoding: StlEncoding,
    /// Faces stored in the input file
    pub original_faces: usize,
    /// Faces in the mesh that was (or would have been) written
    pub final_faces: usize,
    pub decimated: bool,
    /// False under dry run
    pub written: bool,
}

/// Counters for a finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub decimated: usize,
    pub failed: usize,
    /// Subdirectories that could not be listed
    pub skipped_dirs: usize,
}

/// STL files found under a directory
#[derive(Debug, Default)]
pub struct DirectoryScan {
    /// Sorted by path
    pub files: Vec<PathBuf>,
    /// Subdirectories left out because listing them failed
    pub unreadable: Vec<(PathBuf, Error)>,
}

/// List the STL files in `dir`.
///
/// Extensions match case-insensitively. Subdirectories are only entered when
/// `recursive` is set, and symlinked directories are never followed. Failing
/// to list `dir` itself is an error; a subdirectory that cannot be listed is
/// recorded in [`DirectoryScan::unreadable`] and skipped.
pub fn discover_stl_files(dir: &Path, recursive: bool) -> Result<DirectoryScan> {
    let mut scan = DirectoryScan::default();
    scan_directory(dir, recursive, &mut scan)?;
    scan.files.sort();
    Ok(scan)
}

fn scan_directory(dir: &Path, recursive: bool, scan: &mut DirectoryScan) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if recursive {
                scan_subdirectory(&path, scan);
            }
        } else if is_stl_path(&path) && path.is_file() {
            scan.files.push(path);
        }
    }
    Ok(())
}

fn scan_subdirectory(dir: &Path, scan: &mut DirectoryScan) {
    if let Err(e) = scan_directory(dir, true, scan) {
        scan.unreadable.push((dir.to_path_buf(), e));
    }
}

/// Where the normalized mesh for `input` is written.
///
/// `part.STL` becomes `part_fixed.STL` when not overwriting; the extension
/// keeps its letter case.
pub fn output_path(input: &Path, overwrite: bool, suffix: &str) -> PathBuf {
    if overwrite {
        return input.to_path_buf();
    }
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push(suffix);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

fn display_name(path: &Path, base: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}

/// Normalize one file, writing progress lines to `out`.
pub fn process_file<W: Write>(path: &Path, options: &NormalizeOptions, out: &mut W) -> Result<FileReport> {
    writeln!(out, "Reading: {} ...", display_name(path, &options.target_dir))?;

    let (mut mesh, source_encoding) = read_stl_with_encoding(path)?;
    let original_faces = mesh.face_count();
    writeln!(out, "  - Original faces: {} ({})", original_faces, source_encoding)?;

    let repair = mesh.repair();
    if !repair.is_clean() {
        writeln!(
            out,
            "  - Repaired: {} welded vertices, {} degenerate faces, {} duplicate faces, {} unreferenced vertices",
            repair.welded_vertices,
            repair.degenerate_faces,
            repair.duplicate_faces,
            repair.unreferenced_vertices
        )?;
    }
    if mesh.is_empty() {
        return Err(Error::InvalidData(format!(
            "{} contains no usable triangles",
            path.display()
        )));
    }

    let decimated = mesh.face_count() > options.max_faces;
    if decimated {
        writeln!(out, "  - Too many faces (> {}), decimating...", options.max_faces)?;
        mesh = options.decimator().simplify_to_face_count(&mesh, options.max_faces)?;
        writeln!(out, "  - Decimation complete: {} faces", mesh.face_count())?;
        if mesh.face_count() > options.max_faces {
            writeln!(
                out,
                "  - Warning: stopped above {} faces, no further collapse keeps the surface valid",
                options.max_faces
            )?;
        }
    }

    let output = output_path(path, options.overwrite, &options.suffix);
    let output_name = display_name(&output, &options.target_dir);
    let written = if options.dry_run {
        writeln!(out, "  - Dry run, would save to: {} (Binary STL)", output_name)?;
        false
    } else {
        write_mesh(&mesh, &output)?;
        writeln!(out, "  - Saved to: {} (Binary STL)", output_name)?;
        true
    };

    Ok(FileReport {
        input: path.to_path_buf(),
        output,
        source_encoding,
        original_faces,
        final_faces: mesh.face_count(),
        decimated,
        written,
    })
}

/// Normalize every STL file under `options.target_dir`.
///
/// Per-file failures and unreadable subdirectories are printed and counted;
/// only an unreadable `target_dir` or a broken `out` sink aborts the run.
pub fn run_batch<W: Write>(options: &NormalizeOptions, out: &mut W) -> Result<BatchSummary> {
    writeln!(out, "Processing directory: {}", options.target_dir.display())?;

    let scan = discover_stl_files(&options.target_dir, options.recursive)?;
    let mut summary = BatchSummary {
        skipped_dirs: scan.unreadable.len(),
        ..BatchSummary::default()
    };
    for (dir, e) in &scan.unreadable {
        writeln!(out, "Skipping directory {}: {}", display_name(dir, &options.target_dir), e)?;
    }

    let files = scan.files;
    if files.is_empty() {
        writeln!(out, "No STL files found in {}.", options.target_dir.display())?;
        return Ok(summary);
    }

    writeln!(out, "Found {} STL files, starting process...", files.len())?;
    for path in &files {
        match process_file(path, options, out) {
            Ok(report) => {
                summary.processed += 1;
                if report.decimated {
                    summary.decimated += 1;
                }
            }
            Err(e) => {
                summary.failed += 1;
                writeln!(out, "  - Error processing file: {}", e)?;
            }
        }
        writeln!(out, "{}", "-".repeat(30))?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "All done! {} processed, {} decimated, {} failed.",
        summary.processed, summary.decimated, summary.failed
    )?;
    if summary.skipped_dirs > 0 {
        writeln!(out, "{} directories could not be read.", summary.skipped_dirs)?;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_options_for_current_dir() {
        let options = NormalizeOptions::for_current_dir().unwrap();
        assert_eq!(options.target_dir, std::env::current_dir().unwrap());
        assert_eq!(options.max_faces, DEFAULT_MAX_FACES);
    }

    #[test]
    fn test_default_options() {
        let options = NormalizeOptions::new("meshes");
        assert_eq!(options.target_dir, PathBuf::from("meshes"));
        assert_eq!(options.max_faces, 150_000);
        assert!(options.overwrite);
        assert_eq!(options.suffix, "_fixed");
        assert!(!options.recursive);
        assert!(options.preserve_boundary);
        assert!(options.preserve_normal);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_decimator_follows_options() {
        let mut options = NormalizeOptions::new(".");
        options.preserve_boundary = false;
        let d = options.decimator();
        assert!(!d.preserve_boundary);
        assert!(d.preserve_normal);
        assert_eq!(d.max_normal_deviation_deg, 90.0);
    }

    #[test]
    fn test_output_path_overwrite() {
        let input = Path::new("meshes/link.stl");
        assert_eq!(output_path(input, true, "_fixed"), input);
    }

    #[test]
    fn test_output_path_keeps_extension_case() {
        assert_eq!(
            output_path(Path::new("meshes/link.stl"), false, "_fixed"),
            PathBuf::from("meshes/link_fixed.stl")
        );
        assert_eq!(
            output_path(Path::new("meshes/LINK.STL"), false, "_fixed"),
            PathBuf::from("meshes/LINK_fixed.STL")
        );
        assert_eq!(
            output_path(Path::new("base.Stl"), false, "_small"),
            PathBuf::from("base_small.Stl")
        );
    }

    #[test]
    fn test_output_path_keeps_inner_dots() {
        assert_eq!(
            output_path(Path::new("arm.v2.stl"), false, "_fixed"),
            PathBuf::from("arm.v2_fixed.stl")
        );
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b.stl", "A.STL", "c.Stl", "notes.txt", "stl", "mesh.stl.bak"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.stl")).unwrap();

        let files = discover_stl_files(dir.path(), false).unwrap().files;
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.STL", "b.stl", "c.Stl"]);
    }

    #[test]
    fn test_discover_recursive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("top.stl"), b"").unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/deeper/inner.stl"), b"").unwrap();

        assert_eq!(discover_stl_files(dir.path(), false).unwrap().files.len(), 1);
        let all = discover_stl_files(dir.path(), true).unwrap().files;
        assert_eq!(all.len(), 2);
        assert!(all.contains(&dir.path().join("sub/deeper/inner.stl")));
    }

    #[test]
    fn test_discover_missing_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(discover_stl_files(&dir.path().join("absent"), false).is_err());
        assert!(discover_stl_files(&dir.path().join("absent"), true).is_err());
    }

    #[test]
    fn test_unreadable_subdirectory_is_recorded() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("kept.stl"), b"").unwrap();
        let mut scan = DirectoryScan::default();
        scan_directory(dir.path(), true, &mut scan).unwrap();

        // Gone between listing its parent and reading it
        let vanished = dir.path().join("vanished");
        scan_subdirectory(&vanished, &mut scan);

        assert_eq!(scan.files, vec![dir.path().join("kept.stl")]);
        assert_eq!(scan.unreadable.len(), 1);
        assert_eq!(scan.unreadable[0].0, vanished);
        assert!(matches!(scan.unreadable[0].1, Error::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_locked_subdirectory_does_not_abort_scan() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("hidden.stl"), b"").unwrap();
        fs::write(dir.path().join("top.stl"), b"").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Root still lists it
        let privileged = fs::read_dir(&locked).is_ok();

        let result = discover_stl_files(dir.path(), true);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let scan = result.unwrap();
        assert!(scan.files.contains(&dir.path().join("top.stl")));
        if !privileged {
            assert_eq!(scan.unreadable.len(), 1);
            assert!(!scan.files.contains(&locked.join("hidden.stl")));
        }
    }
}
