// src/identity.rs

//! Resolves commit signatures to stable author indices. The same person can
//! commit under different names or emails; signatures sharing either are merged.

use crate::error::Result;
use crate::model::{AuthorId, MISSING_AUTHOR};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Maps lowercased emails and names to author indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityDetector {
    people_dict: HashMap<String, AuthorId>,
    /// author index -> display name
    reversed_people_dict: Vec<String>,
}

impl IdentityDetector {
    /// Reads one person per line, aliases separated by `|`; the first alias is the display name.
    pub fn load_people_dict(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse_people_dict(&text))
    }

    pub fn parse_people_dict(text: &str) -> Self {
        let mut detector = Self::default();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let id = detector.reversed_people_dict.len();
            let aliases: Vec<&str> = line.split('|').map(str::trim).collect();
            for alias in &aliases {
                detector.people_dict.insert(alias.to_lowercase(), id);
            }
            detector.reversed_people_dict.push(aliases[0].to_string());
        }
        detector
    }

    /// Builds the dictionary from `(name, email)` author signatures in commit order.
    pub fn generate<'a>(signatures: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut dict: HashMap<String, AuthorId> = HashMap::new();
        let mut names: Vec<Vec<String>> = Vec::new();
        let mut emails: Vec<Vec<String>> = Vec::new();

        for (name, email) in signatures {
            let name = name.to_lowercase();
            let email = email.to_lowercase();
            if let Some(&id) = dict.get(&email) {
                if !dict.contains_key(&name) {
                    dict.insert(name.clone(), id);
                    names[id].push(name);
                }
                continue;
            }
            if let Some(&id) = dict.get(&name) {
                dict.insert(email.clone(), id);
                emails[id].push(email);
                continue;
            }
            let id = names.len();
            dict.insert(email.clone(), id);
            dict.insert(name.clone(), id);
            names.push(vec![name]);
            emails.push(vec![email]);
        }

        let reversed_people_dict = names
            .into_iter()
            .zip(emails)
            .map(|(mut names, mut emails)| {
                names.sort();
                emails.sort();
                format!("{}|{}", names.join("|"), emails.join("|"))
            })
            .collect();
        Self { people_dict: dict, reversed_people_dict }
    }

    /// Email first, then name; unknown signatures map to [`MISSING_AUTHOR`].
    pub fn resolve(&self, name: &str, email: &str) -> AuthorId {
        self.people_dict
            .get(&email.to_lowercase())
            .or_else(|| self.people_dict.get(&name.to_lowercase()))
            .copied()
            .unwrap_or(MISSING_AUTHOR)
    }

    pub fn people_count(&self) -> usize {
        self.reversed_people_dict.len()
    }

    pub fn reversed_people_dict(&self) -> &[String] {
        &self.reversed_people_dict
    }
}

/// Two author dictionaries joined into one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedIdentities {
    pub reversed_people_dict: Vec<String>,
    /// index in the first dictionary -> merged index
    pub first: Vec<AuthorId>,
    /// index in the second dictionary -> merged index
    pub second: Vec<AuthorId>,
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Joins two display dictionaries. Entries which share any `|`-separated alias
/// are the same person; merged entries list names before emails.
pub fn merge_reversed_dicts(first: &[String], second: &[String]) -> MergedIdentities {
    let entries: Vec<&String> = first.iter().chain(second).collect();
    let mut parent: Vec<usize> = (0..entries.len()).collect();
    let mut owner: HashMap<&str, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        for alias in entry.split('|') {
            match owner.get(alias) {
                Some(&j) => {
                    let (a, b) = (find_root(&mut parent, i), find_root(&mut parent, j));
                    // the root is always the earliest entry
                    parent[a.max(b)] = a.min(b);
                }
                None => {
                    owner.insert(alias, i);
                }
            }
        }
    }

    let mut components: HashMap<usize, usize> = HashMap::new();
    let mut aliases: Vec<BTreeSet<&str>> = Vec::new();
    let mut mapping = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let root = find_root(&mut parent, i);
        let index = *components.entry(root).or_insert_with(|| {
            aliases.push(BTreeSet::new());
            aliases.len() - 1
        });
        aliases[index].extend(entry.split('|'));
        mapping.push(index);
    }

    let reversed_people_dict = aliases
        .into_iter()
        .map(|set| {
            let (names, emails): (Vec<&str>, Vec<&str>) = set.into_iter().partition(|a| !a.contains('@'));
            names.into_iter().chain(emails).collect::<Vec<_>>().join("|")
        })
        .collect();
    let second = mapping.split_off(first.len());
    MergedIdentities { reversed_people_dict, first: mapping, second }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_merges_aliases() {
        let detector = IdentityDetector::generate([
            ("Vadim", "vadim@example.com"),
            ("vadim markovtsev", "vadim@example.com"),
            ("Vadim", "vmarkovtsev@work.com"),
            ("Máximo", "max@example.com"),
        ]);
        assert_eq!(detector.people_count(), 2);
        assert_eq!(
            detector.reversed_people_dict(),
            &[
                "vadim|vadim markovtsev|vadim@example.com|vmarkovtsev@work.com".to_string(),
                "máximo|max@example.com".to_string(),
            ]
        );
        assert_eq!(detector.resolve("anyone", "VMARKOVTSEV@work.com"), 0);
        assert_eq!(detector.resolve("MÁXIMO", "other@example.com"), 1);
        assert_eq!(detector.resolve("stranger", "stranger@example.com"), MISSING_AUTHOR);
    }

    #[test]
    fn test_parse_people_dict() {
        let detector = IdentityDetector::parse_people_dict(
            "Linus Torvalds|torvalds@linux-foundation.org\n\nVadim|vadim@sourced.tech|vmarkovtsev\n",
        );
        assert_eq!(detector.people_count(), 2);
        assert_eq!(detector.reversed_people_dict(), &["Linus Torvalds".to_string(), "Vadim".to_string()]);
        assert_eq!(detector.resolve("x", "TORVALDS@linux-foundation.org"), 0);
        assert_eq!(detector.resolve("VMarkovtsev", "x"), 1);
    }

    #[test]
    fn test_load_people_dict() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("people.txt");
        std::fs::write(&path, "one|one@example.com\ntwo\n")?;
        let detector = IdentityDetector::load_people_dict(&path)?;
        assert_eq!(detector.people_count(), 2);
        assert_eq!(detector.resolve("Two", ""), 1);
        Ok(())
    }

    #[test]
    fn test_merge_reversed_dicts() {
        let first = vec!["alice|alice@x.com".to_string(), "bob|bob@y.com".to_string()];
        let second = vec![
            "carol|carol@z.com".to_string(),
            "bobby|bob@y.com".to_string(),
            "alice|alice@work.com".to_string(),
        ];
        let merged = merge_reversed_dicts(&first, &second);
        assert_eq!(
            merged.reversed_people_dict,
            vec![
                "alice|alice@work.com|alice@x.com".to_string(),
                "bob|bobby|bob@y.com".to_string(),
                "carol|carol@z.com".to_string(),
            ]
        );
        assert_eq!(merged.first, vec![0, 1]);
        assert_eq!(merged.second, vec![2, 1, 0]);
    }

    #[test]
    fn test_merge_bridging_entry_joins_components() {
        // the second dictionary links two people the first kept apart
        let first = vec!["a|a@x.com".to_string(), "b|b@x.com".to_string()];
        let second = vec!["a|b@x.com".to_string()];
        let merged = merge_reversed_dicts(&first, &second);
        assert_eq!(merged.reversed_people_dict, vec!["a|b|a@x.com|b@x.com".to_string()]);
        assert_eq!(merged.first, vec![0, 0]);
        assert_eq!(merged.second, vec![0]);
    }
}
