// src/registry.rs

use crate::config::AnalysisConfig;
use crate::couples::{CouplesAnalysis, CouplesResult};
use crate::error::{AnalysisError, Result};
use crate::model::CommitData;
use crate::serialize;
use crate::shotness::{ShotnessAnalysis, ShotnessResult};
use std::io::Write;

/// An analysis which consumes the commit stream and produces a final report.
///
/// The driver calls `initialize` once, `consume` for every commit in order and
/// `finalize` once after the last commit.
pub trait LeafAnalysis {
    /// Section name in the report
    fn name(&self) -> &'static str;

    /// Command line switch which deploys the analysis
    fn flag(&self) -> &'static str;

    /// Whether the commit stream must carry parsed syntax trees
    fn requires_uast(&self) -> bool {
        false
    }

    /// Whether the commit stream must carry the line counts of changed files
    fn requires_line_counts(&self) -> bool {
        false
    }

    fn initialize(&mut self);

    fn consume(&mut self, commit: &CommitData) -> Result<()>;

    fn finalize(&self) -> Report;
}

/// Finalized result of any analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Couples(CouplesResult),
    Shotness(ShotnessResult),
}

impl Report {
    pub fn write_text(&self, writer: &mut dyn Write) -> Result<()> {
        match self {
            Report::Couples(result) => result.write_text(writer)?,
            Report::Shotness(result) => result.write_text(writer)?,
        }
        Ok(())
    }

    pub fn write_binary(&self, writer: &mut dyn Write) -> Result<()> {
        match self {
            Report::Couples(result) => result.write_binary(writer),
            Report::Shotness(result) => result.write_binary(writer),
        }
    }

    pub fn serialize(&self, binary: bool, writer: &mut dyn Write) -> Result<()> {
        if binary {
            self.write_binary(writer)
        } else {
            self.write_text(writer)
        }
    }

    /// Reads a binary report section by its name.
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Report> {
        match name {
            "Couples" => Ok(Report::Couples(CouplesResult::from_message(serialize::decode(bytes)?)?)),
            "Shotness" => Ok(Report::Shotness(ShotnessResult::from_message(serialize::decode(bytes)?)?)),
            _ => Err(AnalysisError::Decode(format!("unknown section {name}"))),
        }
    }

    /// Joins two reports of the same analysis.
    pub fn merge(&self, other: &Report) -> Result<Report> {
        match (self, other) {
            (Report::Couples(a), Report::Couples(b)) => Ok(Report::Couples(a.merge(b))),
            (Report::Shotness(_), Report::Shotness(_)) => Err(AnalysisError::NotMergeable("Shotness")),
            _ => Err(AnalysisError::Decode("different analyses share a section".to_string())),
        }
    }
}

type Constructor = fn(&AnalysisConfig) -> Result<Box<dyn LeafAnalysis>>;

/// A known analysis
pub struct Registration {
    pub flag: &'static str,
    pub description: &'static str,
    construct: Constructor,
}

fn construct_couples(config: &AnalysisConfig) -> Result<Box<dyn LeafAnalysis>> {
    Ok(Box::new(CouplesAnalysis::new(&config.couples)))
}

fn construct_shotness(config: &AnalysisConfig) -> Result<Box<dyn LeafAnalysis>> {
    Ok(Box::new(ShotnessAnalysis::new(&config.shotness)?))
}

/// All analyses, in deployment order.
pub static REGISTRY: &[Registration] = &[
    Registration {
        flag: "couples",
        description: "files and developers which change together",
        construct: construct_couples,
    },
    Registration {
        flag: "shotness",
        description: "functions which change together",
        construct: construct_shotness,
    },
];

/// Constructs the analysis registered under `flag`.
pub fn summon(flag: &str, config: &AnalysisConfig) -> Result<Box<dyn LeafAnalysis>> {
    let registration = REGISTRY
        .iter()
        .find(|r| r.flag == flag)
        .ok_or_else(|| AnalysisError::Config(format!("unknown analysis: {flag}")))?;
    (registration.construct)(config)
}
