use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use prebuild_patcher::config::{discover, load_all, load_from_path, PatchConfig};
use prebuild_patcher::manifest::{self, ManifestVars};
use prebuild_patcher::plan::{self, PlanReport};
use prebuild_patcher::resolver::normalize;
use prebuild_patcher::{BuildGraph, HookTable, PatchApplicator, PatchOutcome};
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prebuild-patcher")]
#[command(about = "Apply dependency source patches right before their objects compile", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BuildArgs {
    /// Project root (defaults to PREBUILD_PATCHER_PROJECT, then the current directory)
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Build graph snapshot exported by the build tool (TOML, or JSON by extension)
    #[arg(short, long)]
    graph: Option<PathBuf>,

    /// Patch config file or directory of configs (defaults to <project>/patches)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which patches resolve against the build graph
    Plan {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Run the pre-build actions for one artifact (called by the build tool)
    Prebuild {
        #[command(flatten)]
        build: BuildArgs,

        /// Object about to be compiled
        #[arg(short, long)]
        artifact: PathBuf,
    },

    /// Apply every resolved patch now
    Apply {
        #[command(flatten)]
        build: BuildArgs,

        /// Dry run - report what would change without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report whether each resolved patch is already applied
    Status {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Render the web-installer manifest from PLATFORM and VERSION
    Manifest {
        /// Template file
        #[arg(short, long, default_value = "manifest.tmpl")]
        template: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Plan { build } => cmd_plan(build),
        Commands::Prebuild { build, artifact } => cmd_prebuild(build, artifact),
        Commands::Apply {
            build,
            dry_run,
            diff,
        } => cmd_apply(build, dry_run, diff),
        Commands::Status { build } => cmd_status(build),
        Commands::Manifest { template } => cmd_manifest(template),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Everything one build invocation needs.
struct Session {
    project: PathBuf,
    config: PatchConfig,
    graph: BuildGraph,
}

impl Session {
    fn load(args: BuildArgs) -> Result<Self> {
        let project = resolve_project(args.project)?;

        let config_path = args.config.unwrap_or_else(|| project.join("patches"));
        let config = if config_path.is_dir() {
            load_all(&discover(&config_path)?)?
        } else {
            load_from_path(&config_path)?
        };

        let graph_path = args
            .graph
            .unwrap_or_else(|| project.join("build-graph.toml"));
        let graph = BuildGraph::load(&graph_path)
            .with_context(|| "the build tool must export its builders before patching")?;

        Ok(Self {
            project,
            config,
            graph,
        })
    }

    fn prepare(&self) -> Result<(HookTable, PlanReport, Arc<dyn PatchApplicator>)> {
        let applicator = self.config.tool.applicator();
        let mut hooks = HookTable::new();
        let report = plan::prepare(
            &self.config.patches,
            &self.graph,
            &mut hooks,
            Arc::clone(&applicator),
        )?;
        Ok((hooks, report, applicator))
    }

    fn print_header(&self) {
        println!("Project: {}", self.project.display());
        println!("Builders: {}", self.graph.len());
        println!("Patches: {}", self.config.patches.len());
        println!();
    }
}

/// Resolve the project root.
///
/// Priority order:
/// 1. Explicit --project flag
/// 2. PREBUILD_PATCHER_PROJECT environment variable
/// 3. Current directory
fn resolve_project(cli_project: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_project {
        return path
            .canonicalize()
            .with_context(|| format!("project directory {} does not exist", path.display()));
    }

    if let Ok(env_path) = env::var("PREBUILD_PATCHER_PROJECT") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: PREBUILD_PATCHER_PROJECT is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Map the artifact path the build tool passed in onto the key the hooks
/// were registered under (relative to the project root when inside it).
fn artifact_key(artifact: &Path, graph: &BuildGraph) -> PathBuf {
    let project_dir = normalize(graph.project_dir());
    let artifact = normalize(artifact);
    if artifact.is_absolute() {
        if let Ok(relative) = artifact.strip_prefix(&project_dir) {
            return relative.to_path_buf();
        }
    }
    artifact
}

/// Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_skipped(report: &PlanReport) {
    for skipped in &report.skipped {
        println!("{} {}: Skipped ({})", "⊘".cyan(), skipped.id(), skipped);
    }
}

fn cmd_plan(build: BuildArgs) -> Result<()> {
    let session = Session::load(build)?;
    session.print_header();

    let (hooks, report, _) = session.prepare()?;

    for artifact in hooks.artifacts() {
        println!("{}", artifact.display().to_string().bold());
        for action in hooks.actions_for(artifact) {
            println!("  {} {}", "→".green(), action.label());
        }
    }
    print_skipped(&report);

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} registered",
        format!("{}", report.registered.len()).green()
    );
    println!("  {} skipped", format!("{}", report.skipped.len()).cyan());

    Ok(())
}

fn cmd_prebuild(build: BuildArgs, artifact: PathBuf) -> Result<()> {
    let session = Session::load(build)?;
    let (mut hooks, _, _) = session.prepare()?;

    let key = artifact_key(&artifact, &session.graph);
    let outcomes = hooks.run_before(&key)?;

    for (id, outcome) in outcomes {
        match outcome {
            PatchOutcome::Applied { file } => {
                println!("{} {}: Applied to {}", "✓".green(), id, file.display());
            }
            PatchOutcome::AlreadyApplied { file } => {
                println!(
                    "{} {}: Already applied to {}",
                    "⊙".yellow(),
                    id,
                    file.display()
                );
            }
        }
    }

    Ok(())
}

fn cmd_apply(build: BuildArgs, dry_run: bool, show_diff: bool) -> Result<()> {
    let session = Session::load(build)?;
    session.print_header();

    let (mut hooks, report, applicator) = session.prepare()?;

    let mut contents_before: HashMap<PathBuf, String> = HashMap::new();
    if show_diff && !dry_run {
        for registration in &report.registered {
            let source = &registration.target.source_path;
            if let Ok(content) = fs::read_to_string(source) {
                contents_before.entry(source.clone()).or_insert(content);
            }
        }
    }

    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_failed = 0;

    if dry_run {
        println!("{}", "[DRY RUN - showing what would be applied]".cyan());
        for registration in &report.registered {
            match applicator.check(&registration.patch, &registration.target.source_path) {
                Ok(PatchOutcome::Applied { file }) => {
                    println!(
                        "{} {}: Would apply to {}",
                        "✓".green(),
                        registration.id,
                        file.display()
                    );
                    total_applied += 1;
                }
                Ok(PatchOutcome::AlreadyApplied { file }) => {
                    println!(
                        "{} {}: Already applied to {}",
                        "⊙".yellow(),
                        registration.id,
                        file.display()
                    );
                    total_already_applied += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), registration.id, e);
                    total_failed += 1;
                }
            }
        }
    } else {
        let artifacts: Vec<PathBuf> = hooks.artifacts().map(Path::to_path_buf).collect();
        for artifact in artifacts {
            match hooks.run_before(&artifact) {
                Ok(outcomes) => {
                    for (id, outcome) in outcomes {
                        match outcome {
                            PatchOutcome::Applied { file } => {
                                println!("{} {}: Applied to {}", "✓".green(), id, file.display());
                                total_applied += 1;

                                if show_diff {
                                    if let Some(before) = contents_before.get(&file) {
                                        if let Ok(after) = fs::read_to_string(&file) {
                                            if before != &after {
                                                display_diff(&file, before, &after);
                                            }
                                        }
                                    }
                                }
                            }
                            PatchOutcome::AlreadyApplied { file } => {
                                println!(
                                    "{} {}: Already applied to {}",
                                    "⊙".yellow(),
                                    id,
                                    file.display()
                                );
                                total_already_applied += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), e.action, e.source);
                    eprintln!("  Artifact: {}", e.artifact.display());
                    eprintln!("  {}", "The artifact must not be compiled from this source.".red());
                    total_failed += 1;
                }
            }
        }
    }

    print_skipped(&report);

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!(
        "  {} already applied",
        format!("{}", total_already_applied).yellow()
    );
    println!("  {} skipped", format!("{}", report.skipped.len()).cyan());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(build: BuildArgs) -> Result<()> {
    let session = Session::load(build)?;
    let (_, report, applicator) = session.prepare()?;

    println!("{}", "Patch Status Report".bold());
    session.print_header();

    let mut applied = Vec::new();
    let mut not_applied = Vec::new();

    for registration in &report.registered {
        match applicator.check(&registration.patch, &registration.target.source_path) {
            Ok(PatchOutcome::AlreadyApplied { .. }) => applied.push(registration.id.clone()),
            Ok(PatchOutcome::Applied { .. }) => not_applied.push((
                registration.id.clone(),
                "applies cleanly, not yet applied".to_string(),
            )),
            Err(e) => not_applied.push((registration.id.clone(), e.to_string())),
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !not_applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            not_applied.len()
        );
        for (id, reason) in &not_applied {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    if !report.skipped.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊘".cyan(),
            "SKIPPED".cyan().bold(),
            report.skipped.len()
        );
        for skipped in &report.skipped {
            println!("  - {} ({})", skipped.id(), skipped.to_string().dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_manifest(template: PathBuf) -> Result<()> {
    // Both variables are checked before the template is read so a missing one
    // never produces partial output.
    let vars = ManifestVars::from_env()?;
    let rendered = manifest::generate(&template, &vars)?;
    println!("{}", rendered);
    Ok(())
}
