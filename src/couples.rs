// src/couples.rs

//! Which files change together, and which authors share the same files.

use crate::config::CouplesConfig;
use crate::error::{AnalysisError, Result};
use crate::identity;
use crate::model::{Action, AuthorId, Change, CommitData, MISSING_AUTHOR, MISSING_AUTHOR_NAME};
use crate::registry::{LeafAnalysis, Report};
use crate::serialize::{self, safe_string, write_inline_row, CompressedSparseRow, SparseRow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use tracing::debug;

/// Incremental state of the coupling analysis
#[derive(Debug, Default)]
pub struct CouplesAnalysis {
    people_number: usize,
    reversed_people_dict: Vec<String>,
    /// Per author: how many commits touched each file. Deletions keep the history.
    people: Vec<HashMap<String, i64>>,
    /// Per author: number of commits
    people_commits: Vec<i64>,
    /// Every file -> every file which occurred in the same commit -> how many times
    files: HashMap<String, HashMap<String, i64>>,
    /// Last known line count of every live file
    lines: HashMap<String, usize>,
}

/// Finalized coupling matrices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CouplesResult {
    /// Author x author, one row per author plus the unmatched author
    pub people_matrix: Vec<SparseRow>,
    /// Per author: ascending indices into `files`
    pub people_files: Vec<Vec<usize>>,
    /// File x file, rows ordered as `files`
    pub files_matrix: Vec<SparseRow>,
    /// Live files, sorted
    pub files: Vec<String>,
    /// Line count of each file in `files` at the last commit; 0 for binary files
    pub files_lines: Vec<usize>,
    pub reversed_people_dict: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplesIndex {
    pub index: Vec<String>,
    pub matrix: CompressedSparseRow,
}

/// Binary form of [`CouplesResult`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplesMessage {
    pub file_couples: CouplesIndex,
    pub developer_couples: CouplesIndex,
    /// One entry per developer including the unmatched one
    pub touched_files: Vec<Vec<u32>>,
    pub files_lines: Vec<u32>,
}

impl CouplesAnalysis {
    pub fn new(config: &CouplesConfig) -> Self {
        let mut analysis = Self {
            people_number: config.people_number,
            reversed_people_dict: config.reversed_people_dict.clone(),
            ..Self::default()
        };
        analysis.initialize();
        analysis
    }

    fn author_slot(&self, author: AuthorId) -> usize {
        if author == MISSING_AUTHOR || author >= self.people_number {
            self.people_number
        } else {
            author
        }
    }

    /// Applies one commit's changes.
    pub fn consume_changes(&mut self, author: AuthorId, changes: &[Change]) -> Result<()> {
        let author = self.author_slot(author);
        self.people_commits[author] += 1;
        let mut context: Vec<String> = Vec::new();

        for (index, change) in changes.iter().enumerate() {
            let action = change.action().ok_or(AnalysisError::MalformedChange { index })?;
            let from = change.from_name().unwrap_or_default();
            let to = change.to_name().unwrap_or_default();
            match action {
                Action::Insert => self.touch(author, to, &mut context),
                Action::Delete => {
                    // the author's touches are kept: the context does not expire
                    self.delete_file(from);
                    self.lines.remove(from);
                    context.retain(|f| f != from);
                }
                Action::Modify => {
                    if from != to {
                        self.rename_file(from, to);
                        if let Some(lines) = self.lines.remove(from) {
                            self.lines.insert(to.to_string(), lines);
                        }
                        context.retain(|f| f != from);
                    }
                    self.touch(author, to, &mut context);
                }
            }
        }

        for file in &context {
            let lane = self.files.entry(file.clone()).or_default();
            for other in &context {
                *lane.entry(other.clone()).or_default() += 1;
            }
        }
        debug!("Couples: author {} touched {} files", author, context.len());
        Ok(())
    }

    fn touch(&mut self, author: usize, file: &str, context: &mut Vec<String>) {
        *self.people[author].entry(file.to_string()).or_default() += 1;
        context.push(file.to_string());
    }

    fn delete_file(&mut self, name: &str) {
        self.files.remove(name);
        for lane in self.files.values_mut() {
            lane.remove(name);
        }
    }

    fn rename_file(&mut self, from: &str, to: &str) {
        if let Some(lane) = self.files.remove(from) {
            let target = self.files.entry(to.to_string()).or_default();
            for (other, count) in lane {
                *target.entry(other).or_default() += count;
            }
        }
        for lane in self.files.values_mut() {
            rekey(lane, from, to);
        }
        for touches in &mut self.people {
            rekey(touches, from, to);
        }
    }

    /// Builds the sorted file index and the sparse matrices.
    pub fn finalize_result(&self) -> CouplesResult {
        let mut files: Vec<String> = self.files.keys().cloned().collect();
        files.sort();
        let files_index: HashMap<&str, usize> =
            files.iter().enumerate().map(|(i, f)| (f.as_str(), i)).collect();

        let mut people_matrix = Vec::with_capacity(self.people.len());
        let mut people_files = Vec::with_capacity(self.people.len());
        for (i, touches) in self.people.iter().enumerate() {
            let mut row = SparseRow::new();
            if self.people_commits[i] > 0 {
                row.insert(i, self.people_commits[i]);
            }
            for (j, other) in self.people.iter().enumerate() {
                if i == j {
                    continue;
                }
                let overlap: i64 = touches
                    .iter()
                    .filter_map(|(file, &count)| other.get(file).map(|&theirs| count.min(theirs)))
                    .sum();
                if overlap > 0 {
                    row.insert(j, overlap);
                }
            }
            people_matrix.push(row);

            let mut indices: Vec<usize> =
                touches.keys().filter_map(|f| files_index.get(f.as_str()).copied()).collect();
            indices.sort_unstable();
            people_files.push(indices);
        }

        let files_matrix = files
            .iter()
            .map(|file| {
                self.files[file]
                    .iter()
                    .filter_map(|(other, &count)| files_index.get(other.as_str()).map(|&j| (j, count)))
                    .collect()
            })
            .collect();

        let files_lines = files.iter().map(|f| self.lines.get(f).copied().unwrap_or(0)).collect();

        CouplesResult {
            people_matrix,
            people_files,
            files_matrix,
            files,
            files_lines,
            reversed_people_dict: self.reversed_people_dict.clone(),
        }
    }
}

fn rekey(map: &mut HashMap<String, i64>, from: &str, to: &str) {
    if let Some(count) = map.remove(from) {
        *map.entry(to.to_string()).or_default() += count;
    }
}

impl LeafAnalysis for CouplesAnalysis {
    fn name(&self) -> &'static str {
        "Couples"
    }

    fn flag(&self) -> &'static str {
        "couples"
    }

    fn initialize(&mut self) {
        self.people = vec![HashMap::new(); self.people_number + 1];
        self.people_commits = vec![0; self.people_number + 1];
        self.files = HashMap::new();
        self.lines = HashMap::new();
    }

    fn requires_line_counts(&self) -> bool {
        true
    }

    fn consume(&mut self, commit: &CommitData) -> Result<()> {
        self.consume_changes(commit.author, &commit.changes)?;
        for (file, &lines) in &commit.file_lines {
            self.lines.insert(file.clone(), lines);
        }
        Ok(())
    }

    fn finalize(&self) -> Report {
        Report::Couples(self.finalize_result())
    }
}

impl CouplesResult {
    pub fn write_text(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        writeln!(writer, "  files_coocc:")?;
        writeln!(writer, "    index:")?;
        for file in &self.files {
            writeln!(writer, "      - {}", safe_string(file))?;
        }
        writeln!(writer, "    lines:")?;
        for lines in &self.files_lines {
            writeln!(writer, "      - {}", lines)?;
        }
        writeln!(writer, "    matrix:")?;
        for row in &self.files_matrix {
            write!(writer, "      - ")?;
            write_inline_row(writer, row)?;
            writeln!(writer)?;
        }

        writeln!(writer, "  people_coocc:")?;
        writeln!(writer, "    index:")?;
        for person in &self.reversed_people_dict {
            writeln!(writer, "      - {}", safe_string(person))?;
        }
        writeln!(writer, "    matrix:")?;
        for row in &self.people_matrix {
            write!(writer, "      - ")?;
            write_inline_row(writer, row)?;
            writeln!(writer)?;
        }

        // sorted by the number of files each author changed
        writeln!(writer, "    author_files:")?;
        for (author, mut files) in self.author_files() {
            writeln!(writer, "      - {}:", safe_string(author))?;
            files.sort_unstable();
            for file in files {
                writeln!(writer, "        - {}", safe_string(file))?;
            }
        }
        Ok(())
    }

    /// Resolved authors with their touched files, fewest files first.
    fn author_files(&self) -> Vec<(&str, Vec<&str>)> {
        let mut list: Vec<(&str, Vec<&str>)> = self
            .reversed_people_dict
            .iter()
            .zip(&self.people_files)
            .map(|(author, files)| {
                (author.as_str(), files.iter().map(|&f| self.files[f].as_str()).collect())
            })
            .collect();
        list.sort_by_key(|(_, files)| files.len());
        list
    }

    pub fn to_message(&self) -> CouplesMessage {
        CouplesMessage {
            file_couples: CouplesIndex {
                index: self.files.clone(),
                matrix: CompressedSparseRow::from_rows(&self.files_matrix),
            },
            developer_couples: CouplesIndex {
                index: self
                    .reversed_people_dict
                    .iter()
                    .cloned()
                    .chain(std::iter::once(MISSING_AUTHOR_NAME.to_string()))
                    .collect(),
                matrix: CompressedSparseRow::from_rows(&self.people_matrix),
            },
            touched_files: self
                .people_files
                .iter()
                .map(|files| files.iter().map(|&f| f as u32).collect())
                .collect(),
            files_lines: self.files_lines.iter().map(|&n| n as u32).collect(),
        }
    }

    /// Rebuilds the result from its binary form.
    pub fn from_message(message: CouplesMessage) -> Result<Self> {
        let CouplesMessage { file_couples, developer_couples, touched_files, files_lines } = message;
        let files = file_couples.index;
        let files_matrix = file_couples.matrix.to_rows()?;
        if files_matrix.len() != files.len() || files_lines.len() != files.len() {
            return Err(AnalysisError::Decode(format!(
                "{} files with {} matrix rows and {} line counts",
                files.len(),
                files_matrix.len(),
                files_lines.len()
            )));
        }
        let mut reversed_people_dict = developer_couples.index;
        let people_matrix = developer_couples.matrix.to_rows()?;
        if reversed_people_dict.is_empty()
            || people_matrix.len() != reversed_people_dict.len()
            || touched_files.len() != reversed_people_dict.len()
        {
            return Err(AnalysisError::Decode(format!(
                "{} developers with {} matrix rows and {} file lists",
                reversed_people_dict.len(),
                people_matrix.len(),
                touched_files.len()
            )));
        }
        // the last developer is the unmatched one
        reversed_people_dict.pop();
        check_columns(&files_matrix, files.len())?;
        check_columns(&people_matrix, people_matrix.len())?;
        let people_files: Vec<Vec<usize>> =
            touched_files.into_iter().map(|list| list.into_iter().map(|f| f as usize).collect()).collect();
        if people_files.iter().flatten().any(|&f| f >= files.len()) {
            return Err(AnalysisError::Decode("developer touched an unknown file".to_string()));
        }

        Ok(Self {
            people_matrix,
            people_files,
            files_matrix,
            files,
            files_lines: files_lines.into_iter().map(|n| n as usize).collect(),
            reversed_people_dict,
        })
    }

    /// Joins two results. People sharing an alias become one developer,
    /// file indices are the sorted union of both file sets, and every count is summed.
    pub fn merge(&self, other: &CouplesResult) -> CouplesResult {
        let people = identity::merge_reversed_dicts(&self.reversed_people_dict, &other.reversed_people_dict);
        let people_number = people.reversed_people_dict.len();
        let files: Vec<String> =
            self.files.iter().chain(&other.files).cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let files_index: HashMap<&str, usize> =
            files.iter().enumerate().map(|(i, f)| (f.as_str(), i)).collect();

        let mut people_matrix = vec![SparseRow::new(); people_number + 1];
        let mut people_files: Vec<Vec<usize>> = vec![Vec::new(); people_number + 1];
        let mut files_matrix = vec![SparseRow::new(); files.len()];
        let mut files_lines = vec![0; files.len()];
        for (side, mapping) in [(self, &people.first), (other, &people.second)] {
            // indices past the dictionary are the unmatched developer
            let person = |i: usize| mapping.get(i).copied().unwrap_or(people_number);
            let file = |i: usize| files_index[side.files[i].as_str()];
            for (i, row) in side.people_matrix.iter().enumerate() {
                let target = &mut people_matrix[person(i)];
                for (&j, &count) in row {
                    *target.entry(person(j)).or_default() += count;
                }
            }
            for (i, touched) in side.people_files.iter().enumerate() {
                people_files[person(i)].extend(touched.iter().map(|&f| file(f)));
            }
            for (i, row) in side.files_matrix.iter().enumerate() {
                let target = &mut files_matrix[file(i)];
                for (&j, &count) in row {
                    *target.entry(file(j)).or_default() += count;
                }
            }
            for (i, &lines) in side.files_lines.iter().enumerate() {
                files_lines[file(i)] += lines;
            }
        }
        for touched in &mut people_files {
            touched.sort_unstable();
            touched.dedup();
        }

        CouplesResult {
            people_matrix,
            people_files,
            files_matrix,
            files,
            files_lines,
            reversed_people_dict: people.reversed_people_dict,
        }
    }

    pub fn write_binary(&self, writer: &mut dyn Write) -> Result<()> {
        writer.write_all(&serialize::encode(&self.to_message())?)?;
        Ok(())
    }
}

fn check_columns(rows: &[SparseRow], columns: usize) -> Result<()> {
    match rows.iter().flat_map(|row| row.keys()).find(|&&j| j >= columns) {
        Some(j) => Err(AnalysisError::Decode(format!("column {} out of {}", j, columns))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture(people: &[&str]) -> CouplesAnalysis {
        CouplesAnalysis::new(&CouplesConfig {
            people_number: people.len(),
            reversed_people_dict: people.iter().map(|p| p.to_string()).collect(),
        })
    }

    /// `+name` inserts, `-name` deletes, `=name` modifies, `>old>new` renames.
    fn changes(records: &[&str]) -> Vec<Change> {
        records
            .iter()
            .map(|record| {
                let (action, name) = record.split_at(1);
                match action {
                    "+" => Change::insert(name),
                    "-" => Change::delete(name),
                    "=" => Change::modify(name, name),
                    ">" => {
                        let (from, to) = name.split_once('>').unwrap();
                        Change::modify(from, to)
                    }
                    _ => panic!("invalid action {action}"),
                }
            })
            .collect()
    }

    fn consume_fixture_history(c: &mut CouplesAnalysis) {
        c.consume_changes(0, &changes(&["+two", "+four", "+six"])).unwrap();
        c.consume_changes(0, &changes(&["+one", "-two", "=three", ">four>five"])).unwrap();
        c.consume_changes(1, &changes(&["=one", "=three", "-six"])).unwrap();
        c.consume_changes(2, &changes(&["=five"])).unwrap();
    }

    fn row(entries: &[(usize, i64)]) -> SparseRow {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_consume() {
        let mut c = fixture(&["p1", "p2", "p3"]);
        consume_fixture_history(&mut c);

        assert_eq!(c.people[0].len(), 5);
        assert_eq!(c.people[0]["one"], 1);
        assert_eq!(c.people[0]["two"], 1);
        assert_eq!(c.people[0]["three"], 1);
        assert_eq!(c.people[0]["five"], 2);
        assert_eq!(c.people[0]["six"], 1);
        assert!(!c.people[0].contains_key("four"));
        assert_eq!(c.people[1].len(), 2);
        assert_eq!(c.people[1]["one"], 1);
        assert_eq!(c.people[1]["three"], 1);
        assert_eq!(c.people[2].len(), 1);
        assert_eq!(c.people[2]["five"], 1);

        assert_eq!(c.files.len(), 3);
        assert_eq!(c.files["one"], HashMap::from([("one".into(), 2), ("three".into(), 2), ("five".into(), 1)]));
        assert_eq!(c.files["three"], HashMap::from([("three".into(), 2), ("one".into(), 2), ("five".into(), 1)]));
        assert_eq!(c.files["five"], HashMap::from([("five".into(), 3), ("one".into(), 1), ("three".into(), 1)]));
        assert_eq!(c.people_commits, vec![2, 1, 1, 0]);
    }

    #[test]
    fn test_finalize() {
        let mut c = fixture(&["p1", "p2", "p3"]);
        consume_fixture_history(&mut c);
        let result = c.finalize_result();

        assert_eq!(result.files, vec!["five", "one", "three"]);
        assert_eq!(result.people_files, vec![vec![0, 1, 2], vec![1, 2], vec![0], vec![]]);
        assert_eq!(
            result.people_matrix,
            vec![
                row(&[(0, 2), (1, 2), (2, 1)]),
                row(&[(0, 2), (1, 1)]),
                row(&[(0, 1), (2, 1)]),
                row(&[]),
            ]
        );
        assert_eq!(
            result.files_matrix,
            vec![
                row(&[(0, 3), (1, 1), (2, 1)]),
                row(&[(0, 1), (1, 2), (2, 2)]),
                row(&[(0, 1), (1, 2), (2, 2)]),
            ]
        );
        assert_eq!(c.finalize_result(), result);
    }

    #[test]
    fn test_serialize_text() {
        let mut c = fixture(&["p1", "p2", "p3"]);
        consume_fixture_history(&mut c);
        let mut buffer = Vec::new();
        c.finalize_result().write_text(&mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            r#"  files_coocc:
    index:
      - "five"
      - "one"
      - "three"
    lines:
      - 0
      - 0
      - 0
    matrix:
      - {0: 3, 1: 1, 2: 1}
      - {0: 1, 1: 2, 2: 2}
      - {0: 1, 1: 2, 2: 2}
  people_coocc:
    index:
      - "p1"
      - "p2"
      - "p3"
    matrix:
      - {0: 2, 1: 2, 2: 1}
      - {0: 2, 1: 1}
      - {0: 1, 2: 1}
      - {}
    author_files:
      - "p3":
        - "five"
      - "p2":
        - "one"
        - "three"
      - "p1":
        - "five"
        - "one"
        - "three"
"#
        );
    }

    #[test]
    fn test_serialize_binary() {
        let mut c = fixture(&["p1", "p2", "p3"]);
        consume_fixture_history(&mut c);
        let mut buffer = Vec::new();
        c.finalize_result().write_binary(&mut buffer).unwrap();
        let msg: CouplesMessage = serialize::decode(&buffer).unwrap();

        assert_eq!(msg.touched_files, vec![vec![0, 1, 2], vec![1, 2], vec![0], vec![]]);
        assert_eq!(msg.files_lines, vec![0, 0, 0]);
        assert_eq!(msg.developer_couples.index, vec!["p1", "p2", "p3", "<unmatched>"]);
        assert_eq!(msg.developer_couples.matrix.number_of_rows, 4);
        assert_eq!(msg.developer_couples.matrix.number_of_columns, 4);
        assert_eq!(msg.developer_couples.matrix.data, vec![2, 2, 1, 2, 1, 1, 1]);
        assert_eq!(msg.developer_couples.matrix.indices, vec![0, 1, 2, 0, 1, 0, 2]);
        assert_eq!(msg.developer_couples.matrix.indptr, vec![0, 3, 5, 7, 7]);
        assert_eq!(msg.file_couples.index, vec!["five", "one", "three"]);
        assert_eq!(msg.file_couples.matrix.data, vec![3, 1, 1, 1, 2, 2, 1, 2, 2]);
        assert_eq!(msg.file_couples.matrix.indptr, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_two_files_twice() {
        let mut c = fixture(&["dev"]);
        c.consume_changes(0, &changes(&["+a.go", "+b.go"])).unwrap();
        c.consume_changes(0, &changes(&["=a.go", "=b.go"])).unwrap();
        let result = c.finalize_result();
        assert_eq!(result.files, vec!["a.go", "b.go"]);
        assert_eq!(result.files_matrix, vec![row(&[(0, 2), (1, 2)]), row(&[(0, 2), (1, 2)])]);
        assert_eq!(result.people_matrix[0], row(&[(0, 2)]));
    }

    #[test]
    fn test_rename_carries_history() {
        let mut c = fixture(&["dev"]);
        c.consume_changes(0, &changes(&["+x.go"])).unwrap();
        c.consume_changes(0, &changes(&[">x.go>y.go"])).unwrap();

        assert!(!c.files.contains_key("x.go"));
        assert!(c.files.values().all(|lane| !lane.contains_key("x.go")));
        assert!(c.people.iter().all(|touches| !touches.contains_key("x.go")));
        assert_eq!(c.people[0]["y.go"], 2);

        let result = c.finalize_result();
        assert_eq!(result.files, vec!["y.go"]);
        assert_eq!(result.files_matrix, vec![row(&[(0, 2)])]);
    }

    #[test]
    fn test_rename_without_content_preserves_row() {
        let mut c = fixture(&["dev"]);
        c.consume_changes(0, &changes(&["+a", "+b"])).unwrap();
        let before = c.files["a"].clone();
        // a rename alone is still a touch under the new name
        c.consume_changes(0, &changes(&[">a>c"])).unwrap();
        assert_eq!(c.files["c"]["c"], before["a"] + 1);
        assert_eq!(c.files["c"]["b"], before["b"]);
        assert_eq!(c.files["b"]["c"], before["b"]);
        assert!(!c.files["b"].contains_key("a"));
    }

    #[test]
    fn test_delete_purges_but_keeps_touches() {
        let mut c = fixture(&["dev"]);
        c.consume_changes(0, &changes(&["+x.go", "+y.go"])).unwrap();
        c.consume_changes(0, &changes(&["=y.go"])).unwrap();
        c.consume_changes(0, &changes(&["-y.go"])).unwrap();

        assert!(!c.files.contains_key("y.go"));
        assert!(!c.files["x.go"].contains_key("y.go"));
        assert_eq!(c.people[0]["y.go"], 2);

        let result = c.finalize_result();
        assert_eq!(result.files, vec!["x.go"]);
        assert_eq!(result.people_files[0], vec![0]);
        assert_eq!(result.people_matrix[0], row(&[(0, 3)]));
    }

    #[test]
    fn test_chained_renames_in_one_commit() {
        let mut c = fixture(&["dev"]);
        c.consume_changes(0, &changes(&["+a", "+b"])).unwrap();
        c.consume_changes(0, &changes(&[">a>b2", ">b2>c"])).unwrap();

        let result = c.finalize_result();
        assert_eq!(result.files, vec!["b", "c"]);
        // a's history lands on c; the commit touched c once
        assert_eq!(result.files_matrix[1], row(&[(0, 1), (1, 2)]));
        assert_eq!(result.files_matrix[0], row(&[(0, 1), (1, 1)]));
    }

    #[test]
    fn test_missing_author_uses_sentinel_slot() {
        let mut c = fixture(&["dev"]);
        c.consume_changes(MISSING_AUTHOR, &changes(&["+a"])).unwrap();
        assert_eq!(c.people_commits, vec![0, 1]);
        assert_eq!(c.people[1]["a"], 1);
        let result = c.finalize_result();
        assert_eq!(result.people_matrix[1], row(&[(1, 1)]));
        assert_eq!(result.author_files().len(), 1);
    }

    #[test]
    fn test_malformed_change_aborts_commit() {
        let mut c = fixture(&["dev"]);
        let mut list = changes(&["+a"]);
        list.push(Change { from: None, to: None });
        list.push(Change::insert("b"));
        let err = c.consume_changes(0, &list).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedChange { index: 1 }));
        // the touch before the failing record stays, no co-occurrence is recorded
        assert_eq!(c.people[0]["a"], 1);
        assert!(!c.people[0].contains_key("b"));
        assert!(c.files.is_empty());
    }

    #[test]
    fn test_symmetry() {
        let mut c = fixture(&["a", "b"]);
        c.consume_changes(0, &changes(&["+x", "+y", "+z"])).unwrap();
        c.consume_changes(1, &changes(&["=x", "=z"])).unwrap();
        c.consume_changes(0, &changes(&["=y", "-z"])).unwrap();
        let result = c.finalize_result();
        for (i, row) in result.files_matrix.iter().enumerate() {
            for (&j, value) in row {
                assert_eq!(result.files_matrix[j].get(&i), Some(value));
            }
        }
        for (i, row) in result.people_matrix.iter().enumerate() {
            for (&j, value) in row {
                assert_eq!(result.people_matrix[j].get(&i), Some(value));
            }
        }
    }

    #[test]
    fn test_rename_onto_live_path() {
        let mut c = fixture(&["dev"]);
        c.consume_changes(0, &changes(&["+a", "+b", "+c"])).unwrap();
        c.consume_changes(0, &changes(&[">a>b"])).unwrap();

        assert!(c.people.iter().all(|touches| !touches.contains_key("a")));
        assert_eq!(c.people[0]["b"], 3);
        let result = c.finalize_result();
        assert_eq!(result.files, vec!["b", "c"]);
        assert_eq!(result.files_matrix, vec![row(&[(0, 5), (1, 2)]), row(&[(0, 2), (1, 1)])]);
        for (i, row) in result.files_matrix.iter().enumerate() {
            for (&j, value) in row {
                assert_eq!(result.files_matrix[j].get(&i), Some(value));
            }
        }
    }

    fn commit(author: AuthorId, records: &[&str], lines: &[(&str, usize)]) -> CommitData {
        let mut data = CommitData::new(author, changes(records));
        data.file_lines = lines.iter().map(|&(f, n)| (f.to_string(), n)).collect();
        data
    }

    #[test]
    fn test_files_lines_follow_renames_and_deletes() {
        let mut c = fixture(&["dev"]);
        c.consume(&commit(0, &["+a.go", "+b.go", "+logo.png"], &[("a.go", 10), ("b.go", 4)])).unwrap();
        // no count for the new name: the old one is carried over
        c.consume(&commit(0, &[">a.go>c.go"], &[])).unwrap();
        c.consume(&commit(0, &["=b.go", "-logo.png"], &[("b.go", 7)])).unwrap();

        let result = c.finalize_result();
        assert_eq!(result.files, vec!["b.go", "c.go"]);
        assert_eq!(result.files_lines, vec![7, 10]);
    }

    #[test]
    fn test_binary_report_reads_back() {
        let mut c = fixture(&["p1", "p2", "p3"]);
        consume_fixture_history(&mut c);
        c.consume(&commit(MISSING_AUTHOR, &["=one"], &[("one", 12)])).unwrap();
        let result = c.finalize_result();
        let mut buffer = Vec::new();
        result.write_binary(&mut buffer).unwrap();

        let read = CouplesResult::from_message(serialize::decode(&buffer).unwrap()).unwrap();
        assert_eq!(read, result);
    }

    #[test]
    fn test_inconsistent_message_is_rejected() {
        let mut c = fixture(&["p1", "p2", "p3"]);
        consume_fixture_history(&mut c);
        let mut message = c.finalize_result().to_message();
        message.files_lines.pop();
        let err = CouplesResult::from_message(message).unwrap_err();
        assert!(matches!(err, AnalysisError::Decode(_)));

        let mut message = c.finalize_result().to_message();
        message.touched_files[1].push(9);
        let err = CouplesResult::from_message(message).unwrap_err();
        assert!(matches!(err, AnalysisError::Decode(_)));
    }

    #[test]
    fn test_merge() {
        let mut first = fixture(&["alice|alice@x.com"]);
        first.consume(&commit(0, &["+a.go", "+b.go"], &[("a.go", 10), ("b.go", 20)])).unwrap();
        let mut second = fixture(&["bob|bob@y.com", "alice|alice@x.com"]);
        second.consume(&commit(0, &["+b.go", "+c.go"], &[("b.go", 5), ("c.go", 7)])).unwrap();
        second.consume(&commit(1, &["=b.go"], &[])).unwrap();
        second.consume(&commit(MISSING_AUTHOR, &["=c.go"], &[])).unwrap();

        let merged = first.finalize_result().merge(&second.finalize_result());
        assert_eq!(merged.reversed_people_dict, vec!["alice|alice@x.com", "bob|bob@y.com"]);
        assert_eq!(merged.files, vec!["a.go", "b.go", "c.go"]);
        assert_eq!(merged.files_lines, vec![10, 25, 7]);
        assert_eq!(
            merged.files_matrix,
            vec![
                row(&[(0, 1), (1, 1)]),
                row(&[(0, 1), (1, 3), (2, 1)]),
                row(&[(1, 1), (2, 2)]),
            ]
        );
        assert_eq!(
            merged.people_matrix,
            vec![
                row(&[(0, 2), (1, 1)]),
                row(&[(0, 1), (1, 1), (2, 1)]),
                row(&[(1, 1), (2, 1)]),
            ]
        );
        assert_eq!(merged.people_files, vec![vec![0, 1], vec![1, 2], vec![2]]);
    }
}
