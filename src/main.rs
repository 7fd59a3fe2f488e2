// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use git_cochange::cli::{Cli, Command, GraphArgs, IngestArgs};
use git_cochange::config::Config;
use git_cochange::graph::GraphOptions;
use git_cochange::ingest::{self, IngestRequest};
use git_cochange::report::{self, GraphRequest};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading settings")?;
    let start_time = Instant::now();

    match cli.command {
        Command::Ingest(args) => run_ingest(args, &config)?,
        Command::Graph(args) => run_graph(args, &config)?,
    }

    println!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn run_ingest(args: IngestArgs, config: &Config) -> Result<()> {
    let request = IngestRequest {
        repo: args.repo,
        database: args.database.unwrap_or_else(|| config.database.clone()),
        users_file: args.users.unwrap_or_else(|| config.users_file.clone()),
        unknown_users_file: args
            .unknown_users
            .unwrap_or_else(|| config.unknown_users_file.clone()),
        since: args.since,
        until: args.until,
        patterns: args.patterns,
        fresh: args.fresh,
        commit_batch: config.commit_batch,
    };
    let report = ingest::run_ingest(&request)
        .with_context(|| format!("ingesting {}", request.repo.display()))?;

    if let Some(backup) = &report.backup {
        println!("Previous store backed up to {}.", backup.display());
    }
    println!(
        "Ingested {} new commits ({} file changes, {} rows renamed).",
        report.outcome.commits_added, report.outcome.files_added, report.outcome.rows_rewritten
    );
    if let Some(id) = &report.outcome.halted_on {
        println!("Stopped at already stored commit {id}.");
    }
    println!(
        "Store now holds {} commits and {} file changes.",
        report.counts.commits, report.counts.file_changes
    );
    if report.unknown_users > 0 {
        println!(
            "{} authors matched no rule, see {}.",
            report.unknown_users,
            request.unknown_users_file.display()
        );
    }
    Ok(())
}

fn run_graph(args: GraphArgs, config: &Config) -> Result<()> {
    let repository_url = args
        .repository_url
        .unwrap_or_else(|| ingest::repository_url(&args.repo));
    let request = GraphRequest {
        database: args.database.unwrap_or_else(|| config.database.clone()),
        modules_file: args.modules.unwrap_or_else(|| config.modules_file.clone()),
        since: args.since,
        until: args.until,
        team: args.team,
        options: GraphOptions {
            max_files_per_commit: args
                .max_files
                .unwrap_or(config.graph.max_files_per_commit),
            threshold: args.threshold.unwrap_or(config.graph.threshold),
            current_scope: args.folders,
        },
        repository_url,
    };

    if args.all_teams {
        let written = report::run_team_reports(&request, &args.output_dir)
            .context("writing team reports")?;
        for (team, path, summary) in &written {
            println!(
                "{team}: {} files, {} links -> {}",
                summary.nodes,
                summary.edges,
                path.display()
            );
        }
        println!("Wrote {} team reports to {}.", written.len(), args.output_dir.display());
        return Ok(());
    }

    let summary = report::run_graph(&request, &args.output)
        .with_context(|| format!("building graph into {}", args.output.display()))?;
    println!(
        "Graph with {} files, {} links and {} modules written to {}.",
        summary.nodes,
        summary.edges,
        summary.modules,
        args.output.display()
    );
    Ok(())
}
