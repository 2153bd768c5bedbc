// src/combine.rs

//! Joins binary reports of several runs into one.

use crate::error::AnalysisError;
use crate::registry::Report;
use crate::serialize::{self, AnalysisResults, Metadata, FORMAT_VERSION};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Merges `(source, bytes)` binary reports. A single report passes through unchanged.
pub fn combine_reports(inputs: &[(String, Vec<u8>)]) -> Result<AnalysisResults> {
    let mut decoded = Vec::with_capacity(inputs.len());
    for (source, bytes) in inputs {
        let results: AnalysisResults =
            serialize::decode(bytes).with_context(|| format!("Failed to read report {}", source))?;
        if results.header.version != FORMAT_VERSION {
            bail!("{} has report version {}, expected {}", source, results.header.version, FORMAT_VERSION);
        }
        decoded.push((source, results));
    }
    if decoded.len() == 1 {
        if let Some((_, results)) = decoded.pop() {
            return Ok(results);
        }
    }

    let bar = ProgressBar::new(decoded.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("Combining reports");

    let mut header: Option<Metadata> = None;
    let mut repositories = Vec::with_capacity(decoded.len());
    let mut sections: BTreeMap<String, Report> = BTreeMap::new();
    let mut dropped: BTreeSet<String> = BTreeSet::new();
    for (source, results) in decoded {
        match header.as_mut() {
            Some(merged) => merged.merge(&results.header),
            None => header = Some(results.header.clone()),
        }
        repositories.push(results.header.repository);

        for (name, bytes) in results.contents {
            if dropped.contains(&name) {
                continue;
            }
            let report = Report::decode(&name, &bytes)
                .with_context(|| format!("Failed to read {} from {}", name, source))?;
            let merged = match sections.remove(&name) {
                None => report,
                Some(existing) => match existing.merge(&report) {
                    Ok(merged) => merged,
                    Err(AnalysisError::NotMergeable(what)) => {
                        warn!("{} results cannot be combined; the section is dropped", what);
                        dropped.insert(name);
                        continue;
                    }
                    Err(e) => return Err(e).with_context(|| format!("Failed to merge {} from {}", name, source)),
                },
            };
            sections.insert(name, merged);
        }
        debug!("Combined {}", source);
        bar.inc(1);
    }
    bar.finish_with_message("Reports combined");

    repositories.sort();
    let mut header = header.unwrap_or_default();
    header.version = FORMAT_VERSION;
    header.repository = repositories.join(" & ");

    let mut contents = BTreeMap::new();
    for (name, report) in sections {
        let mut message = Vec::new();
        report.serialize(true, &mut message)?;
        contents.insert(name, message);
    }
    info!("Combined {} repositories into {} sections", repositories.len(), contents.len());
    Ok(AnalysisResults { header, contents })
}
