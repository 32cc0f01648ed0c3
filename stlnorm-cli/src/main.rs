use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use stlnorm_cli::{run_batch, NormalizeOptions, DEFAULT_MAX_FACES, DEFAULT_SUFFIX};

#[derive(Parser)]
#[command(name = "stlnorm")]
#[command(about = "Cap the face count of STL meshes and rewrite them as binary STL")]
struct Cli {
    /// Directory holding the STL files (defaults to the current directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Decimate meshes with more faces than this
    #[arg(short, long, default_value_t = DEFAULT_MAX_FACES)]
    max_faces: usize,

    /// Keep the originals and write `<name><suffix>.stl` next to them
    #[arg(long)]
    no_overwrite: bool,

    /// Suffix used with --no-overwrite
    #[arg(long, default_value = DEFAULT_SUFFIX)]
    suffix: String,

    /// Also process subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Allow decimation to move open boundary vertices
    #[arg(long)]
    no_preserve_boundary: bool,

    /// Allow collapses that flip face normals
    #[arg(long)]
    no_preserve_normal: bool,

    /// Report what would happen without writing any file
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base = match cli.dir {
        Some(dir) => NormalizeOptions::new(dir),
        None => NormalizeOptions::for_current_dir().context("Failed to resolve the current directory")?,
    };
    let options = NormalizeOptions {
        max_faces: cli.max_faces,
        overwrite: !cli.no_overwrite,
        suffix: cli.suffix,
        recursive: cli.recursive,
        preserve_boundary: !cli.no_preserve_boundary,
        preserve_normal: !cli.no_preserve_normal,
        dry_run: cli.dry_run,
        ..base
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_batch(&options, &mut out)
        .with_context(|| format!("Failed to process {}", options.target_dir.display()))?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["stlnorm"]).unwrap();
        assert!(cli.dir.is_none());
        assert_eq!(cli.max_faces, DEFAULT_MAX_FACES);
        assert_eq!(cli.suffix, DEFAULT_SUFFIX);
        assert!(!cli.no_overwrite && !cli.recursive && !cli.dry_run);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "stlnorm",
            "--dir",
            "meshes",
            "--max-faces",
            "5000",
            "--no-overwrite",
            "--suffix",
            "_lite",
            "-r",
            "--no-preserve-boundary",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("meshes")));
        assert_eq!(cli.max_faces, 5000);
        assert!(cli.no_overwrite);
        assert_eq!(cli.suffix, "_lite");
        assert!(cli.recursive);
        assert!(cli.no_preserve_boundary);
        assert!(!cli.no_preserve_normal);
        assert!(cli.dry_run);
    }
}
