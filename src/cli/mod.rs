// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All experiment logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `run`     — train, then evaluate on the test split
//   2. `test`    — evaluate only, optionally from a checkpoint
//   3. `prepare` — download a dataset into the cache
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ExperimentArgs, PrepareArgs, TestArgs};

use crate::application::experiment::{Experiment, ExperimentConfig, RunMode};
use crate::ml::metrics::MetricMap;

#[derive(Parser, Debug)]
#[command(
    name = "convnet-experiment",
    version = "0.1.0",
    about = "Train and evaluate VGG / AlexNet image classifiers on MNIST and CIFAR."
)]
pub struct Cli {
    /// The subcommand to run (run, test or prepare)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the application layer.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args)     => run_experiment(args, RunMode::FitAndTest),
            Commands::Test(args)    => run_test(args),
            Commands::Prepare(args) => run_prepare(args),
        }
    }
}

fn run_experiment(args: ExperimentArgs, mode: RunMode) -> Result<()> {
    let config: ExperimentConfig = args.into();
    tracing::info!(
        "Experiment '{}': {} on {} ({})",
        config.run.experiment_name,
        config.model.model,
        config.dataset,
        config.run.accelerator
    );

    let experiment = Experiment::new(config)?;
    let results    = experiment.run(mode)?;
    print_results(&results)
}

fn run_test(args: TestArgs) -> Result<()> {
    run_experiment(args.experiment, RunMode::TestOnly { ckpt_path: args.ckpt_path })
}

fn run_prepare(args: PrepareArgs) -> Result<()> {
    Experiment::prepare_data(args.dataset, args.root_dir)?;
    println!("Dataset {} is ready.", args.dataset);
    Ok(())
}

fn print_results(results: &[MetricMap]) -> Result<()> {
    println!("\n{}", serde_json::to_string_pretty(results)?);
    Ok(())
}
