// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use zipstage::{
    archive::resolve::resolve_include_exclude,
    config::ArchiveDescriptor,
    path::{to_slash, PathKey},
    ArchiveBuilder, ArchiveJob, RenamePair, SevenZip,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "zipstage [options] <zipstage-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Log debug output unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Build(opts) => run_build(opts),
            Command::Pack(opts) => run_pack(opts),
            Command::List(opts) => run_list(opts),
            Command::Extract(opts) => run_extract(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Build every archive listed in descriptor file.
    #[command(override_usage = "zipstage build [options] <descriptor>")]
    Build(BuildOptions),

    /// Build one archive from command line options.
    #[command(override_usage = "zipstage pack [options] --output <file> --include <glob>...")]
    Pack(PackOptions),

    /// List files that include and exclude globs resolve to.
    #[command(override_usage = "zipstage list [options] --include <glob>...")]
    List(ListOptions),

    /// Extract archive into directory.
    #[command(override_usage = "zipstage extract [options] <archive> <destination>")]
    Extract(ExtractOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BuildOptions {
    /// Path to archive descriptor.
    #[arg(required = true, value_name = "descriptor")]
    pub descriptor: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PackOptions {
    /// Archive to write.
    #[arg(short, long, value_name = "file")]
    pub output: PathBuf,

    /// Directory to base globs and archive paths on.
    #[arg(short, long, default_value = ".", value_name = "dir")]
    pub base_dir: PathBuf,

    /// Glob of files to include.
    #[arg(short, long, required = true, value_name = "glob")]
    pub include: Vec<String>,

    /// Glob of files to exclude.
    #[arg(short, long, value_name = "glob")]
    pub exclude: Vec<String>,

    /// Rename rule of the form source=destination.
    #[arg(short, long, value_name = "rule", value_parser = parse_rename)]
    pub rename: Vec<RenamePair>,

    /// Store files without compression.
    #[arg(short, long)]
    pub copy_mode: bool,

    /// Add to existing archive instead of replacing it.
    #[arg(short, long)]
    pub append: bool,

    /// Archiver binary to run.
    #[arg(long, default_value = "7z", value_name = "binary")]
    pub archiver: PathBuf,

    /// Show archiver progress.
    #[arg(short, long)]
    pub progress: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// Directory to base globs on.
    #[arg(short, long, default_value = ".", value_name = "dir")]
    pub base_dir: PathBuf,

    /// Glob of files to include.
    #[arg(short, long, required = true, value_name = "glob")]
    pub include: Vec<String>,

    /// Glob of files to exclude.
    #[arg(short, long, value_name = "glob")]
    pub exclude: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ExtractOptions {
    /// Archive to extract.
    #[arg(required = true, value_name = "archive")]
    pub archive: PathBuf,

    /// Directory to extract into.
    #[arg(required = true, value_name = "destination")]
    pub destination: PathBuf,

    /// Clear out destination before extracting.
    #[arg(short, long)]
    pub force: bool,

    /// Archiver binary to run.
    #[arg(long, default_value = "7z", value_name = "binary")]
    pub archiver: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run_build(opts: BuildOptions) -> Result<()> {
    let mut descriptor = ArchiveDescriptor::from_file(&opts.descriptor)?;
    let root = opts
        .descriptor
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    descriptor.rebase(root);

    let archiver = descriptor.archiver.to_archiver()?;
    let builder = ArchiveBuilder::new(archiver).with_lzma2(descriptor.archiver.lzma2.clone());

    for entry in descriptor.archives {
        let output = entry.output.clone();
        builder
            .build(&ArchiveJob::from(entry))
            .with_context(|| format!("failed to build {:?}", output.display()))?;
    }

    for entry in descriptor.mapped {
        builder
            .build_mapped(&entry.output, &entry.base_dir, &entry.mapping, entry.copy_mode)
            .with_context(|| format!("failed to build {:?}", entry.output.display()))?;
    }

    Ok(())
}

fn run_pack(opts: PackOptions) -> Result<()> {
    let archiver = SevenZip::new(opts.archiver).with_progress(opts.progress);
    let job = ArchiveJob::new(opts.output, opts.base_dir, opts.include)
        .exclude(opts.exclude)
        .rename(opts.rename)
        .copy_mode(opts.copy_mode)
        .append(opts.append);

    let report = ArchiveBuilder::new(archiver).build(&job)?;
    info!(
        "wrote {:?} ({} files)",
        report.output.display(),
        report.direct + report.staged
    );

    Ok(())
}

fn run_list(opts: ListOptions) -> Result<()> {
    let base_dir = PathKey::try_new_dir(&opts.base_dir)?;
    let files = resolve_include_exclude(&base_dir, opts.include, opts.exclude)?;
    for path in files.paths() {
        println!("{}", to_slash(path));
    }

    Ok(())
}

fn run_extract(opts: ExtractOptions) -> Result<()> {
    let archiver = SevenZip::new(opts.archiver);
    archiver.extract_fresh(&opts.archive, &opts.destination, opts.force)?;

    Ok(())
}

fn parse_rename(rule: &str) -> Result<RenamePair, String> {
    match rule.split_once('=') {
        Some((source, destination)) if !source.is_empty() && !destination.is_empty() => {
            Ok(RenamePair::new(source, destination))
        }
        _ => Err(format!("expected source=destination, got {rule:?}")),
    }
}
