//! dylibbundler - Bundle the dynamic libraries a macOS application needs.
//!
//! Copies non-system libraries next to an executable and rewrites every
//! reference so the application runs on machines without them installed.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use dylib_bundler::settings::{environment_search_paths, DEFAULT_DEST_DIR, DEFAULT_INNER_PATH};
use dylib_bundler::{
    bundle, Codesign, HostFilesystem, InstallNameTool, MachOInspector, Permissions, Settings,
    TerminalPrompt, Tools,
};

/// Two-letter flags accepted for compatibility, and their long forms.
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-of", "--overwrite-files"),
    ("-od", "--overwrite-dir"),
    ("-cd", "--create-dir"),
    ("-ns", "--no-codesign"),
];

/// Bundle the dynamic libraries an application needs into the application itself.
#[derive(Parser, Debug)]
#[command(name = "dylibbundler")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Executable or plug-in whose library references should be fixed (repeatable)
    #[arg(short = 'x', long = "fix-file", value_name = "FILE")]
    fix_files: Vec<PathBuf>,

    /// Copy the libraries into the destination directory
    #[arg(short = 'b', long)]
    bundle_deps: bool,

    /// Directory the libraries are copied into
    #[arg(short = 'd', long, value_name = "DIR", default_value = DEFAULT_DEST_DIR)]
    dest_dir: String,

    /// Install path the executables will reference the libraries by
    #[arg(short = 'p', long, value_name = "PATH", default_value = DEFAULT_INNER_PATH)]
    install_path: String,

    /// Extra directory to look for libraries in (repeatable)
    #[arg(short = 's', long = "search-path", value_name = "DIR")]
    search_paths: Vec<String>,

    /// Leave libraries under this prefix where they are (repeatable)
    #[arg(short = 'i', long = "ignore", value_name = "PREFIX")]
    ignored_prefixes: Vec<String>,

    /// Replace libraries already present in the destination (-of)
    #[arg(long)]
    overwrite_files: bool,

    /// Erase and recreate the destination directory; implies --create-dir (-od)
    #[arg(long)]
    overwrite_dir: bool,

    /// Create the destination directory if it is missing (-cd)
    #[arg(long)]
    create_dir: bool,

    /// Do not re-sign patched binaries (-ns)
    #[arg(long)]
    no_codesign: bool,

    /// Verbosity level (0=errors, 1=warnings, 2=info, 3=debug)
    #[arg(short, long, default_value = "2")]
    verbosity: u8,
}

impl Cli {
    fn permissions(&self) -> Permissions {
        let mut permissions = Permissions::empty();
        permissions.set(Permissions::OVERWRITE_FILES, self.overwrite_files);
        permissions.set(
            Permissions::OVERWRITE_DIR | Permissions::CREATE_DIR,
            self.overwrite_dir,
        );
        if self.create_dir {
            permissions |= Permissions::CREATE_DIR;
        }
        permissions
    }

    fn settings(&self) -> Settings {
        let settings = Settings::new()
            .with_dest_dir(&self.dest_dir)
            .with_inner_path(&self.install_path)
            .with_bundling(self.bundle_deps)
            .with_search_paths(environment_search_paths())
            .with_search_paths(&self.search_paths)
            .allow(self.permissions());

        let settings = if self.no_codesign {
            settings.deny(Permissions::CODESIGN)
        } else {
            settings
        };

        let settings = self
            .ignored_prefixes
            .iter()
            .fold(settings, |s, prefix| s.with_ignored_prefix(prefix));
        self.fix_files
            .iter()
            .fold(settings, |s, file| s.with_file_to_fix(file))
    }
}

/// Rewrites the two-letter legacy flags to their long forms.
fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            LEGACY_FLAGS
                .iter()
                .find(|(short, _)| arg == *short)
                .map_or(arg, |(_, long)| OsString::from(long))
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(normalize_legacy_flags(std::env::args_os()));
    setup_logging(cli.verbosity);

    if !cli.bundle_deps && cli.fix_files.is_empty() {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    run(&cli.settings())
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

fn run(settings: &Settings) -> Result<()> {
    let start = Instant::now();

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let patcher = InstallNameTool::new();
    let signer = Codesign::new();
    let tools = Tools {
        filesystem: &HostFilesystem,
        patcher: &patcher,
        signer: &signer,
    };

    let report = bundle(settings, &MachOInspector, tools, TerminalPrompt, &progress)
        .context("Bundling failed")?;

    info!(
        "Done: {} libraries, {} operations ({} rewrites) in {:.2}s",
        report.libraries.len(),
        report.operations,
        report.patches,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
