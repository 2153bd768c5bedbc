// src/history.rs

//! Walks the repository history and turns every commit into a [`CommitData`]
//! record which is fed to the deployed analyses in order.

use crate::identity::IdentityDetector;
use crate::model::{Change, ChangeEntry, CommitData, EditKind, EditOp, FileDiff, UastChange};
use crate::parser::{self, Language};
use crate::registry::LeafAnalysis;
use crate::uast::Node;
use anyhow::{Context, Result};
use git2::{Delta, DiffDelta, DiffFile, DiffFindOptions, DiffOptions, Oid, Repository, Sort};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use similar::{DiffOp, TextDiff};
use std::collections::HashMap;
use tracing::{debug, info};

/// Commits of HEAD, oldest first.
pub fn load_commits(repo: &Repository, first_parent: bool) -> Result<Vec<Oid>> {
    let mut revwalk = repo.revwalk()?;
    revwalk.push_head().context("Repository has no HEAD")?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
    if first_parent {
        revwalk.simplify_first_parent()?;
    }
    let commits = revwalk.collect::<Result<Vec<_>, _>>()?;
    info!("Loaded {} commits", commits.len());
    Ok(commits)
}

/// `(name, email)` author signatures of `commits`, in the same order.
pub fn signatures(repo: &Repository, commits: &[Oid]) -> Result<Vec<(String, String)>> {
    commits
        .iter()
        .map(|oid| {
            let commit = repo.find_commit(*oid)?;
            let author = commit.author();
            Ok((
                author.name().unwrap_or_default().to_string(),
                author.email().unwrap_or_default().to_string(),
            ))
        })
        .collect()
}

/// Time span and size of an analysis run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub begin_time: i64,
    pub end_time: i64,
    pub commits: usize,
}

/// What the deployed analyses need besides the change list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Syntax trees and line diffs of supported source files
    pub uast: bool,
    /// Line counts of inserted and modified files
    pub line_counts: bool,
}

impl LoadOptions {
    pub fn for_analyses(analyses: &[Box<dyn LeafAnalysis>]) -> Self {
        Self {
            uast: analyses.iter().any(|a| a.requires_uast()),
            line_counts: analyses.iter().any(|a| a.requires_line_counts()),
        }
    }
}

/// Blob contents gathered for one change before the parallel diff/parse stage
struct FileJob {
    change: Change,
    before: Option<String>,
    after: Option<String>,
    line_diff: bool,
    parse: bool,
    line_count: bool,
}

#[derive(Default)]
struct JobOutput {
    file_diff: Option<(String, FileDiff)>,
    uast_change: Option<UastChange>,
    line_count: Option<(String, usize)>,
}

/// Builds [`CommitData`] records out of commits.
pub struct CommitLoader<'r> {
    repo: &'r Repository,
    identity: &'r IdentityDetector,
    options: LoadOptions,
}

impl<'r> CommitLoader<'r> {
    pub fn new(repo: &'r Repository, identity: &'r IdentityDetector, options: LoadOptions) -> Self {
        Self { repo, identity, options }
    }

    pub fn load(&self, oid: Oid) -> Result<CommitData> {
        let commit = self.repo.find_commit(oid)?;
        let signature = commit.author();
        let author = self.identity.resolve(
            signature.name().unwrap_or_default(),
            signature.email().unwrap_or_default(),
        );

        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };
        let current_tree = commit.tree()?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_filemode(true);
        diff_opts.include_typechange(true);
        let mut diff =
            self.repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&current_tree), Some(&mut diff_opts))?;
        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))?;

        let changes: Vec<Change> = diff.deltas().filter_map(|delta| convert_delta(&delta)).collect();
        debug!("Commit {}: {} changes", oid, changes.len());

        let jobs: Vec<FileJob> = changes.iter().map(|change| self.prepare(change)).collect();
        let outputs: Vec<JobOutput> = jobs.into_par_iter().map(process_job).collect();

        let mut file_diffs = HashMap::new();
        let mut uast_changes = Vec::new();
        let mut file_lines = HashMap::new();
        for output in outputs {
            file_diffs.extend(output.file_diff);
            uast_changes.extend(output.uast_change);
            file_lines.extend(output.line_count);
        }

        Ok(CommitData {
            hash: oid,
            time: commit.time().seconds(),
            author,
            changes,
            file_diffs,
            uast_changes,
            file_lines,
        })
    }

    /// Reads the blobs a change needs. Blob access stays on the caller's thread.
    fn prepare(&self, change: &Change) -> FileJob {
        let parse = |entry: &ChangeEntry| self.options.uast && Language::from_path(&entry.name).is_some();
        // only the structural analysis reads line diffs, and only between two parsed versions
        let line_diff = match (&change.from, &change.to) {
            (Some(from), Some(to)) => parse(from) && parse(to),
            _ => false,
        };
        let before = change
            .from
            .as_ref()
            .filter(|e| change.to.is_some() && parse(*e))
            .and_then(|e| self.blob_text(e.blob));
        let after = change
            .to
            .as_ref()
            .filter(|e| self.options.line_counts || parse(*e))
            .and_then(|e| self.blob_text(e.blob));
        FileJob {
            change: change.clone(),
            before,
            after,
            line_diff,
            parse: self.options.uast,
            line_count: self.options.line_counts,
        }
    }

    /// `None` for missing or binary blobs.
    fn blob_text(&self, oid: Oid) -> Option<String> {
        let blob = self.repo.find_blob(oid).ok()?;
        if blob.is_binary() {
            return None;
        }
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }
}

fn diff_entry(file: &DiffFile<'_>) -> Option<ChangeEntry> {
    let name = file.path()?.to_str()?;
    Some(ChangeEntry::new(name, file.id()))
}

fn convert_delta(delta: &DiffDelta<'_>) -> Option<Change> {
    let from = diff_entry(&delta.old_file());
    let to = diff_entry(&delta.new_file());
    match delta.status() {
        Delta::Added | Delta::Copied => Some(Change { from: None, to }),
        Delta::Deleted => Some(Change { from, to: None }),
        Delta::Modified | Delta::Renamed | Delta::Typechange => Some(Change { from, to }),
        _ => None,
    }
}

fn process_job(job: FileJob) -> JobOutput {
    let Some(name) = job.change.to_name() else {
        return JobOutput { uast_change: parse_change(&job), ..JobOutput::default() };
    };
    let file_diff = match (&job.before, &job.after) {
        (Some(before), Some(after)) if job.line_diff => Some((name.to_string(), line_diff(before, after))),
        _ => None,
    };
    // binary blobs count as empty
    let line_count = job
        .line_count
        .then(|| (name.to_string(), job.after.as_deref().map_or(0, |text| text.lines().count())));
    JobOutput { file_diff, uast_change: parse_change(&job), line_count }
}

fn parse_side(entry: Option<&ChangeEntry>, text: Option<&String>) -> Option<Node> {
    let language = Language::from_path(&entry?.name)?;
    parser::parse(language, text?)
}

/// A side without a supported language turns the change into an addition or a deletion.
fn parse_change(job: &FileJob) -> Option<UastChange> {
    if !job.parse {
        return None;
    }
    if job.change.to.is_none() {
        Language::from_path(job.change.from_name()?)?;
        return Some(UastChange { change: job.change.clone(), before: None, after: None });
    }
    let before = parse_side(job.change.from.as_ref(), job.before.as_ref());
    let after = parse_side(job.change.to.as_ref(), job.after.as_ref());
    if before.is_none() && after.is_none() {
        return None;
    }
    Some(UastChange { change: job.change.clone(), before, after })
}

/// Line-level edit script; a replacement becomes a deletion followed by an insertion.
pub fn line_diff(before: &str, after: &str) -> FileDiff {
    let diff = TextDiff::from_lines(before, after);
    let mut ops = Vec::new();
    let mut push = |kind: EditKind, len: usize| {
        if len > 0 {
            ops.push(EditOp::new(kind, len));
        }
    };
    for op in diff.ops() {
        match *op {
            DiffOp::Equal { len, .. } => push(EditKind::Equal, len),
            DiffOp::Delete { old_len, .. } => push(EditKind::Delete, old_len),
            DiffOp::Insert { new_len, .. } => push(EditKind::Insert, new_len),
            DiffOp::Replace { old_len, new_len, .. } => {
                push(EditKind::Delete, old_len);
                push(EditKind::Insert, new_len);
            }
        }
    }
    FileDiff {
        old_lines: diff.old_slices().len(),
        new_lines: diff.new_slices().len(),
        ops,
    }
}

/// Feeds every commit to every analysis, in order.
pub fn analyze(
    repo: &Repository,
    commits: &[Oid],
    identity: &IdentityDetector,
    analyses: &mut [Box<dyn LeafAnalysis>],
) -> Result<RunSummary> {
    let options = LoadOptions::for_analyses(analyses);
    debug!("Loading commits with {:?}", options);
    let loader = CommitLoader::new(repo, identity, options);
    for analysis in analyses.iter_mut() {
        analysis.initialize();
    }

    let bar = ProgressBar::new(commits.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("Analyzing commits");

    let mut summary = RunSummary { commits: commits.len(), ..RunSummary::default() };
    for (i, oid) in commits.iter().enumerate() {
        let data = loader
            .load(*oid)
            .with_context(|| format!("Failed to load commit {}", oid))?;
        if i == 0 {
            summary.begin_time = data.time;
        }
        summary.end_time = data.time;
        for analysis in analyses.iter_mut() {
            analysis
                .consume(&data)
                .with_context(|| format!("{} failed on commit {}", analysis.name(), oid))?;
        }
        bar.inc(1);
    }
    bar.finish_with_message("Analysis complete");
    Ok(summary)
}
