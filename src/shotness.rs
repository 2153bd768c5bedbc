// src/shotness.rs

//! Structural hotness: which functions are edited together.
//!
//! Every commit, the syntax trees of both versions of each changed file are
//! filtered down to the tracked entities. The line-level edit script then
//! tells which of those entities were actually edited. Entities are keyed by
//! kind, name and file, so renaming a file rekeys every entity inside it.

use crate::config::ShotnessConfig;
use crate::error::{AnalysisError, QueryError, Result};
use crate::model::{CommitData, EditKind, FileDiff};
use crate::query::Query;
use crate::registry::{LeafAnalysis, Report};
use crate::serialize::{self, safe_string, SparseRow};
use crate::uast::{Node, Role};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Write;
use tracing::{debug, warn};

/// Identity and description of a tracked entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub internal_role: String,
    pub roles: Vec<Role>,
    pub name: String,
    pub file: String,
}

impl NodeSummary {
    /// The registry key. Changes whenever the file is renamed.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.internal_role, self.name, self.file)
    }
}

#[derive(Debug, Clone)]
struct NodeShotness {
    count: i64,
    summary: NodeSummary,
    /// key of every entity edited in the same commit -> number of such commits
    couples: HashMap<String, i64>,
}

/// Incremental state of the structural hotness analysis
#[derive(Debug)]
pub struct ShotnessAnalysis {
    xpath_struct: Query,
    xpath_name: Query,
    nodes: HashMap<String, NodeShotness>,
    /// file -> keys of the entities which live in it
    files: HashMap<String, BTreeSet<String>>,
}

/// Finalized entity index and counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShotnessResult {
    /// Sorted by key
    pub nodes: Vec<NodeSummary>,
    /// Per entity: own index -> touch count, coupled index -> co-edit count
    pub counters: Vec<SparseRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotnessRecord {
    pub name: String,
    pub file: String,
    pub internal_role: String,
    pub roles: Vec<i32>,
    pub counters: BTreeMap<u32, u32>,
}

/// Binary form of [`ShotnessResult`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotnessMessage {
    pub records: Vec<ShotnessRecord>,
}

type LineIndex<'a> = Vec<Vec<(&'a str, &'a Node)>>;

impl ShotnessAnalysis {
    pub fn new(config: &ShotnessConfig) -> Result<Self> {
        let (xpath_struct, xpath_name) = config.compile()?;
        debug!("Shotness: structure {:?}, name {:?}", xpath_struct.as_str(), xpath_name.as_str());
        Ok(Self {
            xpath_struct,
            xpath_name,
            nodes: HashMap::new(),
            files: HashMap::new(),
        })
    }

    /// Applies one commit's syntax tree changes.
    pub fn consume_commit(&mut self, commit: &CommitData) {
        let mut touched: HashSet<String> = HashSet::new();

        for change in &commit.uast_changes {
            let Some(after) = &change.after else {
                if let Some(from) = change.change.from_name() {
                    self.delete_file(from);
                }
                continue;
            };
            let Some(to_name) = change.change.to_name() else {
                warn!("Shotness: commit {} has a new syntax tree without a destination", commit.hash);
                continue;
            };

            let Some(before) = &change.before else {
                match self.extract_nodes(after) {
                    Ok(nodes) => {
                        for (name, node) in nodes {
                            self.add_node(&mut touched, name, node, to_name);
                        }
                    }
                    Err(e) => warn!(
                        "Shotness: commit {} file {} failed to filter UAST: {}",
                        commit.hash, to_name, e
                    ),
                }
                continue;
            };

            if let Some(from) = change.change.from_name() {
                if from != to_name {
                    self.rename_file(from, to_name);
                }
            }

            let nodes_before = match self.extract_nodes(before) {
                Ok(nodes) => nodes,
                Err(e) => {
                    warn!(
                        "Shotness: commit ^{} file {} failed to filter UAST: {}",
                        commit.hash,
                        change.change.from_name().unwrap_or(to_name),
                        e
                    );
                    continue;
                }
            };
            let nodes_after = match self.extract_nodes(after) {
                Ok(nodes) => nodes,
                Err(e) => {
                    warn!(
                        "Shotness: commit {} file {} failed to filter UAST: {}",
                        commit.hash, to_name, e
                    );
                    continue;
                }
            };
            let Some(diff) = commit.file_diffs.get(to_name) else {
                debug!("Shotness: commit {} file {} has no diff", commit.hash, to_name);
                continue;
            };
            // the rename above already moved everything to the new name
            self.touch_edited(&mut touched, diff, &nodes_before, &nodes_after, to_name);
        }

        self.couple(&touched);
        debug!("Shotness: commit {} touched {} entities", commit.hash, touched.len());
    }

    /// Returns the outermost matched entities by display name.
    fn extract_nodes<'a>(&self, root: &'a Node) -> std::result::Result<BTreeMap<&'a str, &'a Node>, QueryError> {
        let structs = self.xpath_struct.filter(root)?;
        // some entities may be inside others; keep only the outermost
        let mut internal: HashSet<*const Node> = HashSet::new();
        for main in &structs {
            for sub in self.xpath_struct.filter(main)? {
                if !std::ptr::eq(sub, *main) {
                    internal.insert(sub as *const Node);
                }
            }
        }
        let mut result = BTreeMap::new();
        for node in structs {
            if internal.contains(&(node as *const Node)) {
                continue;
            }
            if let Some(name) = self.xpath_name.filter(node)?.into_iter().next() {
                result.insert(name.token.as_str(), node);
            }
        }
        Ok(result)
    }

    fn add_node(&mut self, touched: &mut HashSet<String>, name: &str, node: &Node, file: &str) {
        let summary = NodeSummary {
            internal_role: node.internal_type.clone(),
            roles: node.roles.clone(),
            name: name.to_string(),
            file: file.to_string(),
        };
        let key = summary.key();
        let first_touch = touched.insert(key.clone());
        match self.nodes.entry(key) {
            Entry::Occupied(mut entry) => {
                // additions and removals in the same entity count once
                if first_touch {
                    entry.get_mut().count += 1;
                }
            }
            Entry::Vacant(entry) => {
                self.files.entry(file.to_string()).or_default().insert(entry.key().clone());
                entry.insert(NodeShotness { count: 1, summary, couples: HashMap::new() });
            }
        }
    }

    fn touch_edited(
        &mut self,
        touched: &mut HashSet<String>,
        diff: &FileDiff,
        nodes_before: &BTreeMap<&str, &Node>,
        nodes_after: &BTreeMap<&str, &Node>,
        file: &str,
    ) {
        let lines_before = line_index(nodes_before, diff.old_lines);
        let lines_after = line_index(nodes_after, diff.new_lines);
        let (mut line_before, mut line_after) = (0, 0);
        for op in &diff.ops {
            match op.kind {
                EditKind::Delete => {
                    self.touch_lines(touched, &lines_before, line_before, op.len, file);
                    line_before += op.len;
                }
                EditKind::Insert => {
                    self.touch_lines(touched, &lines_after, line_after, op.len, file);
                    line_after += op.len;
                }
                EditKind::Equal => {
                    line_before += op.len;
                    line_after += op.len;
                }
            }
        }
    }

    fn touch_lines(
        &mut self,
        touched: &mut HashSet<String>,
        lines: &LineIndex<'_>,
        start: usize,
        len: usize,
        file: &str,
    ) {
        for owners in lines.iter().skip(start).take(len) {
            for &(name, node) in owners {
                self.add_node(touched, name, node, file);
            }
        }
    }

    fn couple(&mut self, touched: &HashSet<String>) {
        let live: Vec<&String> = touched.iter().filter(|key| self.nodes.contains_key(*key)).collect();
        for &key in &live {
            if let Some(record) = self.nodes.get_mut(key) {
                for &other in &live {
                    if other != key {
                        *record.couples.entry(other.clone()).or_default() += 1;
                    }
                }
            }
        }
    }

    fn delete_file(&mut self, name: &str) {
        let Some(keys) = self.files.remove(name) else {
            return;
        };
        for key in &keys {
            if let Some(record) = self.nodes.remove(key) {
                for partner in record.couples.keys() {
                    if let Some(partner) = self.nodes.get_mut(partner) {
                        partner.couples.remove(key);
                    }
                }
            }
        }
    }

    fn rename_file(&mut self, from: &str, to: &str) {
        let Some(old_keys) = self.files.remove(from) else {
            return;
        };
        let mut mapping: HashMap<String, String> = HashMap::new();
        let mut moved = Vec::with_capacity(old_keys.len());
        for old_key in old_keys {
            if let Some(mut record) = self.nodes.remove(&old_key) {
                record.summary.file = to.to_string();
                let new_key = record.summary.key();
                mapping.insert(old_key.clone(), new_key.clone());
                moved.push((old_key, new_key, record));
            }
        }

        // only the coupled entities can reference a moved key
        for (old_key, new_key, record) in &mut moved {
            for partner in record.couples.keys() {
                if mapping.contains_key(partner) {
                    continue;
                }
                if let Some(partner) = self.nodes.get_mut(partner) {
                    rekey(&mut partner.couples, old_key, new_key);
                }
            }
            for (partner, count) in std::mem::take(&mut record.couples) {
                let partner = mapping.get(&partner).cloned().unwrap_or(partner);
                *record.couples.entry(partner).or_default() += count;
            }
        }

        let index = self.files.entry(to.to_string()).or_default();
        for (_, new_key, record) in moved {
            index.insert(new_key.clone());
            match self.nodes.entry(new_key) {
                Entry::Occupied(mut entry) => {
                    let key = entry.key().clone();
                    let existing = entry.get_mut();
                    existing.count += record.count;
                    for (partner, count) in record.couples {
                        *existing.couples.entry(partner).or_default() += count;
                    }
                    existing.couples.remove(&key);
                }
                Entry::Vacant(entry) => {
                    entry.insert(record);
                }
            }
        }
    }

    /// Sorts the keys and builds one counter row per entity.
    pub fn finalize_result(&self) -> ShotnessResult {
        let mut keys: Vec<&String> = self.nodes.keys().collect();
        keys.sort();
        let index: HashMap<&str, usize> =
            keys.iter().enumerate().map(|(i, key)| (key.as_str(), i)).collect();

        let mut result = ShotnessResult::default();
        for (i, key) in keys.iter().enumerate() {
            let record = &self.nodes[*key];
            let mut counter = SparseRow::new();
            counter.insert(i, record.count);
            for (partner, &count) in &record.couples {
                if let Some(&j) = index.get(partner.as_str()) {
                    counter.insert(j, count);
                }
            }
            result.nodes.push(record.summary.clone());
            result.counters.push(counter);
        }
        result
    }
}

fn rekey(map: &mut HashMap<String, i64>, from: &str, to: &str) {
    if let Some(count) = map.remove(from) {
        *map.entry(to.to_string()).or_default() += count;
    }
}

/// Last line occupied by an entity which starts at `start`.
fn end_line(node: &Node, start: usize) -> usize {
    if let Some(end) = node.end_position {
        if end.line > start {
            return end.line;
        }
    }
    let mut end = start;
    node.visit_each(&mut |child| {
        if let Some(child_start) = child.start_position {
            let candidate = child.end_position.map_or(child_start.line, |p| p.line);
            end = end.max(candidate);
        }
    });
    end
}

/// For every line of the file (0-based), the entities which occupy it.
fn line_index<'a>(nodes: &BTreeMap<&'a str, &'a Node>, lines: usize) -> LineIndex<'a> {
    let mut index: LineIndex<'a> = vec![Vec::new(); lines];
    for (&name, &node) in nodes {
        let Some(start) = node.start_position else {
            continue;
        };
        let start_line = start.line.max(1);
        for line in start_line..=end_line(node, start.line) {
            if let Some(owners) = index.get_mut(line - 1) {
                owners.push((name, node));
            }
        }
    }
    index
}

impl LeafAnalysis for ShotnessAnalysis {
    fn name(&self) -> &'static str {
        "Shotness"
    }

    fn flag(&self) -> &'static str {
        "shotness"
    }

    fn requires_uast(&self) -> bool {
        true
    }

    fn initialize(&mut self) {
        self.nodes = HashMap::new();
        self.files = HashMap::new();
    }

    fn consume(&mut self, commit: &CommitData) -> Result<()> {
        self.consume_commit(commit);
        Ok(())
    }

    fn finalize(&self) -> Report {
        Report::Shotness(self.finalize_result())
    }
}

impl ShotnessResult {
    pub fn write_text(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        for (summary, counter) in self.nodes.iter().zip(&self.counters) {
            writeln!(writer, "  - name: {}", safe_string(&summary.name))?;
            writeln!(writer, "    file: {}", safe_string(&summary.file))?;
            writeln!(writer, "    internal_role: {}", summary.internal_role)?;
            let roles: Vec<String> = summary.roles.iter().map(|r| r.code().to_string()).collect();
            writeln!(writer, "    roles: [{}]", roles.join(","))?;
            let counters: Vec<String> =
                counter.iter().map(|(key, value)| format!("\"{key}\":{value}")).collect();
            writeln!(writer, "    counters: {{{}}}", counters.join(","))?;
        }
        Ok(())
    }

    pub fn to_message(&self) -> ShotnessMessage {
        ShotnessMessage {
            records: self
                .nodes
                .iter()
                .zip(&self.counters)
                .map(|(summary, counter)| ShotnessRecord {
                    name: summary.name.clone(),
                    file: summary.file.clone(),
                    internal_role: summary.internal_role.clone(),
                    roles: summary.roles.iter().map(|r| r.code()).collect(),
                    counters: counter.iter().map(|(&k, &v)| (k as u32, v as u32)).collect(),
                })
                .collect(),
        }
    }

    pub fn write_binary(&self, writer: &mut dyn Write) -> Result<()> {
        writer.write_all(&serialize::encode(&self.to_message())?)?;
        Ok(())
    }

    /// Rebuilds the result from its binary form.
    pub fn from_message(message: ShotnessMessage) -> Result<Self> {
        let total = message.records.len();
        let mut result = ShotnessResult::default();
        for record in message.records {
            let roles = record
                .roles
                .iter()
                .map(|&code| Role::from_code(code).ok_or_else(|| AnalysisError::Decode(format!("unknown role {code}"))))
                .collect::<Result<Vec<_>>>()?;
            if let Some(&j) = record.counters.keys().find(|&&j| j as usize >= total) {
                return Err(AnalysisError::Decode(format!("entity {} out of {}", j, total)));
            }
            result.nodes.push(NodeSummary {
                internal_role: record.internal_role,
                roles,
                name: record.name,
                file: record.file,
            });
            result.counters.push(record.counters.into_iter().map(|(k, v)| (k as usize, v as i64)).collect());
        }
        Ok(result)
    }
}
