// src/main.rs

//! git-coupling mines a repository's history for files, developers and
//! functions which change together.

mod cli;
mod combine;
mod config;
mod couples;
mod error;
mod history;
mod identity;
mod model;
mod parser;
mod query;
mod registry;
mod serialize;
mod shotness;
mod uast;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Args, Command};
use config::{AnalysisConfig, CouplesConfig, FileConfig, ShotnessConfig};
use git2::Repository;
use identity::IdentityDetector;
use registry::{LeafAnalysis, Report, REGISTRY};
use serialize::{AnalysisResults, Metadata, FORMAT_VERSION};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())))
        .init();

    match &args.command {
        Some(Command::Combine { files }) => run_combine(files, args.output.as_deref()),
        None => run_analysis(&args),
    }
}

fn run_analysis(args: &Args) -> Result<()> {
    let start_time = Instant::now();
    let flags = args.analysis_flags();
    if flags.is_empty() {
        bail!("No analysis requested: pass --couples and/or --shotness");
    }

    let file_config = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let repo = Repository::open(&args.repo)
        .with_context(|| format!("Failed to open repository at {}", args.repo.display()))?;
    info!("Analyzing repository at: {}", args.repo.display());

    let first_parent = file_config.history.first_parent && !args.all_parents;
    let commits = history::load_commits(&repo, first_parent)?;

    let identity = match args.people_dict.as_ref().or(file_config.identity.people_dict.as_ref()) {
        Some(path) => IdentityDetector::load_people_dict(path)
            .with_context(|| format!("Failed to read people dictionary {}", path.display()))?,
        None => {
            let signatures = history::signatures(&repo, &commits)?;
            IdentityDetector::generate(signatures.iter().map(|(name, email)| (name.as_str(), email.as_str())))
        }
    };
    info!("Resolved {} developers", identity.people_count());

    let config = AnalysisConfig {
        couples: CouplesConfig {
            people_number: identity.people_count(),
            reversed_people_dict: identity.reversed_people_dict().to_vec(),
        },
        shotness: ShotnessConfig {
            xpath_struct: args.shotness_xpath_struct.clone().unwrap_or(file_config.shotness.xpath_struct),
            xpath_name: args.shotness_xpath_name.clone().unwrap_or(file_config.shotness.xpath_name),
        },
    };

    let mut analyses: Vec<Box<dyn LeafAnalysis>> = Vec::new();
    for registration in REGISTRY.iter().filter(|r| flags.contains(&r.flag)) {
        let analysis = registry::summon(registration.flag, &config)?;
        info!("Deploying {}: {}", analysis.flag(), registration.description);
        analyses.push(analysis);
    }

    let summary = history::analyze(&repo, &commits, &identity, &mut analyses)?;
    info!(
        "Analysis finished in {:.2?}. History spans from {} to {}.",
        start_time.elapsed(),
        format_time(summary.begin_time),
        format_time(summary.end_time),
    );

    let reports: Vec<(&'static str, Report)> = analyses.iter().map(|a| (a.name(), a.finalize())).collect();
    let header = Metadata {
        version: FORMAT_VERSION,
        repository: args.repo.display().to_string(),
        begin_unix_time: summary.begin_time,
        end_unix_time: summary.end_time,
        commits: summary.commits as u32,
        run_time: start_time.elapsed().as_millis() as u64,
    };

    let mut out = open_output(args.output.as_deref())?;
    if args.binary {
        write_binary(header, &reports, &mut out)?;
    } else {
        header.write_text(&mut out)?;
        for (name, report) in &reports {
            writeln!(out, "{}:", name)?;
            report.serialize(false, &mut out)?;
        }
    }
    out.flush()?;

    info!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn run_combine(files: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let start_time = Instant::now();
    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        inputs.push((path.display().to_string(), bytes));
    }
    let results = combine::combine_reports(&inputs)?;

    let mut out = open_output(output)?;
    out.write_all(&serialize::encode(&results)?)?;
    out.flush()?;
    info!("Combined {} reports in {:.2?}", files.len(), start_time.elapsed());
    Ok(())
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn write_binary(header: Metadata, reports: &[(&'static str, Report)], out: &mut dyn Write) -> Result<()> {
    let mut results = AnalysisResults { header, ..Default::default() };
    for (name, report) in reports {
        let mut message = Vec::new();
        report.serialize(true, &mut message)?;
        results.contents.insert(name.to_string(), message);
    }
    out.write_all(&serialize::encode(&results)?)?;
    Ok(())
}

fn format_time(unix_time: i64) -> String {
    chrono::DateTime::from_timestamp(unix_time, 0)
        .map(|t| t.to_rfc2822())
        .unwrap_or_else(|| unix_time.to_string())
}
