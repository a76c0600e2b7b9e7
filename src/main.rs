//! Main CLI application for the timed attack tree engine

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use timed_attack_tree::{
    attack_tree::{create_example_trees, load_tree_from_file, propagate, AttackTree},
    config::{CliOverrides, OutputFormat, Settings},
    synthesis::{
        explain_infeasibility_with, BoundedSynthesizer, CostOptimizer, Diagnosis, Infeasible,
        OptimizationOutcome, Schedule, SynthesisOptions, SynthesisOutcome,
    },
    utils::{save_tikz, ColorOutput, ScheduleFormatter},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "attack-tree")]
#[command(about = "Timed attack tree propagation, synthesis and optimization")]
#[command(version = "0.1.0")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every solving command
#[derive(Args, Debug, Clone)]
struct SolveArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Attack tree file, YAML or JSON (overrides config)
    #[arg(short, long)]
    tree: Option<PathBuf>,

    /// Largest trace-length bound to explore (overrides config)
    #[arg(short, long)]
    max_bound: Option<usize>,

    /// Per-check timeout in seconds, 0 for none (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Solve all bounds concurrently
    #[arg(long)]
    parallel: bool,

    /// Output directory (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Format of saved schedules (overrides config)
    #[arg(long, value_parser = parse_format)]
    format: Option<OutputFormat>,

    /// Save the resulting schedule
    #[arg(long)]
    save: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Propagate time windows and report structural violations
    Propagate {
        /// Attack tree file
        tree: PathBuf,
    },

    /// Find a schedule with the fewest actions
    Synthesize {
        #[command(flatten)]
        args: SolveArgs,
    },

    /// Find the cheapest schedule over all bounds
    Optimize {
        #[command(flatten)]
        args: SolveArgs,
    },

    /// Explain why no schedule exists at a given bound
    Explain {
        #[command(flatten)]
        args: SolveArgs,

        /// Trace-length bound to diagnose
        #[arg(short, long)]
        bound: usize,
    },

    /// Export the tree as a standalone TikZ document
    Render {
        /// Attack tree file
        tree: PathBuf,

        /// Output `.tex` file
        #[arg(short, long, default_value = "output/tree.tex")]
        output: PathBuf,

        /// Draw the tree after window propagation
        #[arg(long)]
        propagated: bool,
    },

    /// Create example configuration and tree files
    Setup {
        /// Directory to create files in
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,

        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },
}

fn parse_format(value: &str) -> Result<OutputFormat, String> {
    match value.to_ascii_lowercase().as_str() {
        "text" | "txt" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(format!("unknown format '{other}': expected text or json")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Propagate { tree } => propagate_command(&tree),
        Commands::Synthesize { args } => synthesize_command(args, cli.verbose),
        Commands::Optimize { args } => optimize_command(args),
        Commands::Explain { args, bound } => explain_command(args, bound),
        Commands::Render { tree, output, propagated } => render_command(&tree, &output, propagated),
        Commands::Setup { directory, force } => setup_command(directory, force),
    }
}

/// Load configuration, apply overrides and read the tree
fn prepare(args: &SolveArgs) -> Result<(Settings, AttackTree)> {
    let mut settings = if args.config.exists() {
        Settings::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {}", args.config.display()))?
    } else {
        println!(
            "{}",
            ColorOutput::warning(&format!("Config file {} not found, using defaults", args.config.display()))
        );
        Settings::default()
    };

    settings.merge_with_cli(&CliOverrides {
        timeout_seconds: args.timeout,
        max_bound: args.max_bound,
        parallel: args.parallel,
        tree_file: args.tree.clone(),
        output_dir: args.output.clone(),
        format: args.format,
        save: args.save,
    });
    settings.validate().context("Configuration validation failed")?;
    settings.ensure_tree_file()?;

    let tree = load_tree_from_file(&settings.input.tree_file)?;
    println!(
        "{}",
        ColorOutput::info(&format!(
            "Loaded tree '{}' ({} leaves, depth {}):",
            tree.name(),
            tree.leaf_count(),
            tree.depth()
        ))
    );
    print!("{}", ScheduleFormatter::format_tree(&tree));
    println!();

    Ok((settings, tree))
}

fn report_schedule(settings: &Settings, schedule: &Schedule) -> Result<()> {
    println!("{}", ScheduleFormatter::format_schedule(schedule));
    if settings.output.save_schedule {
        let path = ScheduleFormatter::save_schedule(
            schedule,
            &settings.output.output_directory,
            settings.output.format,
        )
        .context("Failed to save schedule")?;
        println!("{}", ColorOutput::success(&format!("Schedule saved to {}", path.display())));
    }
    Ok(())
}

fn report_infeasible(infeasible: &Infeasible) {
    match infeasible {
        Infeasible::Violations(violations) => {
            println!("{}", ColorOutput::error("❌ Tree rejected by window propagation"));
            print!("{}", ScheduleFormatter::format_violations(violations));
        }
        Infeasible::NoSchedule { max_bound } => println!(
            "{}",
            ColorOutput::error(&format!("❌ No schedule with at most {max_bound} actions"))
        ),
    }
}

fn propagate_command(path: &Path) -> Result<()> {
    let tree = load_tree_from_file(path)?;
    match propagate(&tree) {
        Ok(propagated) => {
            println!("{}", ColorOutput::success("✅ Windows are consistent"));
            print!("{}", ScheduleFormatter::format_tree(&propagated));
        }
        Err(violations) => {
            println!("{}", ColorOutput::error("❌ Propagation failed"));
            print!("{}", ScheduleFormatter::format_violations(&violations));
        }
    }
    Ok(())
}

fn synthesize_command(args: SolveArgs, verbose: bool) -> Result<()> {
    let (settings, tree) = prepare(&args)?;
    println!("{}", ColorOutput::info("🧮 Searching for the shortest schedule..."));

    let start_time = Instant::now();
    let synthesizer = BoundedSynthesizer::new(SynthesisOptions::from(&settings));
    let outcome = synthesizer.synthesize(&tree).context("Synthesis failed")?;
    let elapsed = start_time.elapsed();

    match outcome {
        SynthesisOutcome::Found(schedule) => {
            println!(
                "{}",
                ColorOutput::success(&format!(
                    "✅ Found a schedule with {} action(s) in {:.3}s",
                    schedule.len(),
                    elapsed.as_secs_f64()
                ))
            );
            report_schedule(&settings, &schedule)?;

            if verbose {
                let stats = synthesizer
                    .encoding_statistics(&tree, schedule.bound)
                    .context("Failed to rebuild encoding")?;
                println!("{stats}");
            }
        }
        SynthesisOutcome::Infeasible(infeasible) => report_infeasible(&infeasible),
        SynthesisOutcome::SolverUnknown { bound, reason } => println!(
            "{}",
            ColorOutput::warning(&format!("⚠️  Solver gave up at bound {bound}: {reason}"))
        ),
    }
    Ok(())
}

fn optimize_command(args: SolveArgs) -> Result<()> {
    let (settings, tree) = prepare(&args)?;
    println!("{}", ColorOutput::info("🧮 Minimizing attack cost over all bounds..."));

    let start_time = Instant::now();
    let outcome = CostOptimizer::new(SynthesisOptions::from(&settings))
        .optimize(&tree)
        .context("Optimization failed")?;
    let elapsed = start_time.elapsed();

    match outcome {
        OptimizationOutcome::Optimal { schedule, total_cost } => {
            println!(
                "{}",
                ColorOutput::success(&format!(
                    "✅ Optimal cost {} found in {:.3}s",
                    total_cost,
                    elapsed.as_secs_f64()
                ))
            );
            report_schedule(&settings, &schedule)?;
        }
        OptimizationOutcome::Infeasible(infeasible) => report_infeasible(&infeasible),
        OptimizationOutcome::SolverUnknown { bound, reason, best } => {
            println!(
                "{}",
                ColorOutput::warning(&format!("⚠️  Solver gave up at bound {bound}: {reason}"))
            );
            if let Some(schedule) = best {
                println!("Best schedule found so far (not proven optimal):");
                report_schedule(&settings, &schedule)?;
            }
        }
    }
    Ok(())
}

fn explain_command(args: SolveArgs, bound: usize) -> Result<()> {
    let (settings, tree) = prepare(&args)?;
    println!("{}", ColorOutput::info(&format!("🔍 Diagnosing bound {bound}...")));

    let diagnosis = explain_infeasibility_with(&tree, bound, &SynthesisOptions::from(&settings))
        .context("Diagnosis failed")?;

    match diagnosis {
        Diagnosis::Violations(violations) => report_infeasible(&Infeasible::Violations(violations)),
        Diagnosis::Conflict(core) => print!("{}", ScheduleFormatter::format_core(bound, &core)),
        Diagnosis::Feasible(schedule) => {
            println!("{}", ColorOutput::success("✅ The tree is feasible at this bound"));
            report_schedule(&settings, &schedule)?;
        }
        Diagnosis::Unknown(reason) => {
            println!("{}", ColorOutput::warning(&format!("⚠️  Solver gave up: {reason}")))
        }
    }
    Ok(())
}

fn render_command(path: &Path, output: &Path, propagated: bool) -> Result<()> {
    let mut tree = load_tree_from_file(path)?;
    if propagated {
        tree = match propagate(&tree) {
            Ok(tree) => tree,
            Err(violations) => {
                print!("{}", ScheduleFormatter::format_violations(&violations));
                anyhow::bail!("Cannot render a propagated tree with violations");
            }
        };
    }
    save_tikz(&tree, output)?;
    println!("{}", ColorOutput::success(&format!("TikZ written to {}", output.display())));
    Ok(())
}

fn setup_command(directory: PathBuf, force: bool) -> Result<()> {
    println!("{}", ColorOutput::info("🛠️  Setting up project structure..."));

    let config_dir = directory.join("config");
    let input_dir = directory.join("input/trees");
    let output_dir = directory.join("output/schedules");

    for dir in [&config_dir, &input_dir, &output_dir] {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let config_path = config_dir.join("default.yaml");
    if !config_path.exists() || force {
        let mut default_settings = Settings::default();
        default_settings.input.tree_file = PathBuf::from("input/trees/paper_example.yaml");
        default_settings
            .to_file(&config_path)
            .context("Failed to create default configuration")?;
        println!("Created: {}", config_path.display());
    } else {
        println!("Skipped: {} (already exists)", config_path.display());
    }

    create_example_trees(&input_dir).context("Failed to create example trees")?;
    println!("Created example trees in: {}", input_dir.display());

    let examples_dir = config_dir.join("examples");
    std::fs::create_dir_all(&examples_dir)?;

    let mut parallel_config = Settings::default();
    parallel_config.solver.parallel_bounds = true;
    parallel_config.input.tree_file = PathBuf::from("input/trees/extended_example.yaml");
    parallel_config.to_file(&examples_dir.join("parallel.yaml"))?;

    let mut json_config = Settings::default();
    json_config.output.format = OutputFormat::Json;
    json_config.output.save_schedule = true;
    json_config.input.tree_file = PathBuf::from("input/trees/sequential_example.yaml");
    json_config.to_file(&examples_dir.join("json_output.yaml"))?;

    println!("Created example configurations in: {}", examples_dir.display());

    println!("\n{}", ColorOutput::success("✅ Setup complete!"));
    println!("\nNext steps:");
    println!("1. Edit configuration files in {}", config_dir.display());
    println!("2. Add your attack trees to {}", input_dir.display());
    println!("3. Run: cargo run -- optimize --config config/default.yaml");

    Ok(())
}
