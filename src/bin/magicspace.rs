// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use magicspace::{Builder, GitCli, SyncOutcome, Synchronizer, DEFAULT_TEMPLATE_DIR};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use git2::Repository;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
    process::exit,
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  magicspace [options] <magicspace-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Create(opts) => run_create(opts),
            Command::Init(opts) => run_init(opts),
            Command::Update(opts) => run_update(opts),
            Command::UpdateDirs(opts) => run_update_dirs(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Create new repository and initialize it from template directory.
    #[command(override_usage = "magicspace create [options] <dir>")]
    Create(CreateOptions),

    /// Merge generated output into project for the first time.
    #[command(override_usage = "magicspace init [options] [dir]")]
    Init(InitOptions),

    /// Merge changes of generated output since last initialize or update.
    #[command(override_usage = "magicspace update [options] [dir]")]
    Update(UpdateOptions),

    /// List directories renamed by pending merge.
    #[command(override_usage = "magicspace update-dirs [options] [dir]")]
    UpdateDirs(UpdateDirsOptions),
}

#[derive(Args, Clone, Debug)]
struct TemplateOptions {
    /// Template directory, relative paths resolve against project directory.
    #[arg(short, long, value_name = "path", default_value = DEFAULT_TEMPLATE_DIR)]
    pub template: PathBuf,
}

impl TemplateOptions {
    fn resolve(&self, project: &Path) -> PathBuf {
        if self.template.is_absolute() {
            self.template.clone()
        } else {
            project.join(&self.template)
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CreateOptions {
    /// Directory of new project.
    #[arg(required = true, value_name = "dir")]
    pub dir: PathBuf,

    /// Template directory, relative paths resolve against current directory.
    #[arg(short, long, value_name = "path", default_value = DEFAULT_TEMPLATE_DIR)]
    pub template: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Project directory.
    #[arg(value_name = "dir", default_value = ".")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub template: TemplateOptions,

    /// Initialize again even if project was initialized before.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct UpdateOptions {
    /// Project directory.
    #[arg(value_name = "dir", default_value = ".")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub template: TemplateOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct UpdateDirsOptions {
    /// Project directory.
    #[arg(value_name = "dir", default_value = ".")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub template: TemplateOptions,

    /// Move content of renamed directories to their new location.
    #[arg(short, long)]
    pub apply: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn synchronizer(project: &Path, builder: &Builder) -> Synchronizer<GitCli> {
    Synchronizer::new(GitCli::new(), project, builder.settings().git.clone())
}

fn with_spinner<T>(message: &str, task: impl FnOnce() -> T) -> T {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = task();
    spinner.finish_and_clear();
    result
}

fn report(outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Merged { conflicts: true } => warn!("{outcome}"),
        _ => info!("{outcome}"),
    }
}

fn run_create(opts: CreateOptions) -> Result<()> {
    create_dir_all(&opts.dir)
        .with_context(|| format!("failed to create {:?}", opts.dir.display()))?;
    Repository::init(&opts.dir)
        .with_context(|| format!("failed to initialize repository at {:?}", opts.dir.display()))?;

    let builder = Builder::open(&opts.template)?;
    let sync = synchronizer(&opts.dir, &builder);
    let outcome = with_spinner("merging generated files", || sync.initialize(&builder, false))?;
    report(outcome);

    Ok(())
}

fn run_init(opts: InitOptions) -> Result<()> {
    let builder = Builder::open(opts.template.resolve(&opts.dir))?;
    let sync = synchronizer(&opts.dir, &builder);
    let outcome = with_spinner("merging generated files", || {
        sync.initialize(&builder, opts.force)
    })?;
    report(outcome);

    Ok(())
}

fn run_update(opts: UpdateOptions) -> Result<()> {
    let builder = Builder::open(opts.template.resolve(&opts.dir))?;
    let sync = synchronizer(&opts.dir, &builder);
    let outcome = with_spinner("merging generated changes", || sync.update(&builder))?;
    report(outcome);

    Ok(())
}

fn run_update_dirs(opts: UpdateDirsOptions) -> Result<()> {
    let builder = Builder::open(opts.template.resolve(&opts.dir))?;
    let sync = synchronizer(&opts.dir, &builder);
    let renames = sync.detect_renames()?;
    if renames.is_empty() {
        info!("no renamed directories detected");
        return Ok(());
    }

    for rename in &renames {
        info!("possible directory rename {rename}");
    }

    if opts.apply {
        let moved = sync.apply_renames(&renames)?;
        info!("moved {} entries", moved.len());
    }

    Ok(())
}
