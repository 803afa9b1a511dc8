//! Cross-label overlap resolution.
//!
//! Two polygons from different instances that cover most of each other are
//! near-duplicates. A directional rule `(label, other)` says when the
//! `label` polygon gives way to a better scored `other` polygon.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::polygon;
use crate::types::ScoredPolygon;

fn default_overlap_threshold() -> f64 {
    0.7
}

fn default_margin_threshold() -> f64 {
    0.2
}

/// Thresholds of one suppression rule.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Rule {
    /// Both intersection-over-area ratios must exceed this.
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    /// The other polygon must outscore this one by more than this.
    #[serde(default = "default_margin_threshold")]
    pub margin_threshold: f64,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            overlap_threshold: default_overlap_threshold(),
            margin_threshold: default_margin_threshold(),
        }
    }
}

impl Rule {
    /// Whether a polygon (`ioa_self`, `score_self`) yields to the other one.
    pub fn fires(&self, ioa_self: f64, ioa_other: f64, score_self: f64, score_other: f64) -> bool {
        ioa_self > self.overlap_threshold
            && ioa_other > self.overlap_threshold
            && score_other - score_self > self.margin_threshold
    }
}

/// One entry of a rule file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RuleEntry {
    pub label: String,
    pub other: String,
    #[serde(flatten)]
    pub rule: Rule,
}

/// Directional suppression rules keyed by `(label, other)`.
///
/// Serialized as a list of `{label, other, overlap_threshold, margin_threshold}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(from = "Vec<RuleEntry>", into = "Vec<RuleEntry>")]
pub struct RuleTable {
    rules: BTreeMap<String, BTreeMap<String, Rule>>,
}

impl From<Vec<RuleEntry>> for RuleTable {
    fn from(entries: Vec<RuleEntry>) -> Self {
        let mut table = RuleTable::new();
        for e in entries {
            table.insert(e.label, e.other, e.rule);
        }
        table
    }
}

impl From<RuleTable> for Vec<RuleEntry> {
    fn from(table: RuleTable) -> Self {
        table
            .rules
            .into_iter()
            .flat_map(|(label, others)| {
                others.into_iter().map(move |(other, rule)| RuleEntry {
                    label: label.clone(),
                    other,
                    rule,
                })
            })
            .collect()
    }
}

impl RuleTable {
    /// A table without rules: nothing is ever suppressed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Floor-plan policy: living/dining/kitchen (`LDK`) and corridor (`廊下`)
    /// regions give way to a clearly better scored western-style room (`洋室`).
    pub fn floor_plan() -> Self {
        RuleTable::new()
            .with_rule("LDK", "洋室", Rule::default())
            .with_rule("廊下", "洋室", Rule::default())
    }

    /// Load a rule list from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            operation: "open rule file",
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_rule(mut self, label: impl Into<String>, other: impl Into<String>, rule: Rule) -> Self {
        self.insert(label, other, rule);
        self
    }

    /// Add or replace the rule for `(label, other)`; returns the replaced one.
    pub fn insert(
        &mut self,
        label: impl Into<String>,
        other: impl Into<String>,
        rule: Rule,
    ) -> Option<Rule> {
        self.rules
            .entry(label.into())
            .or_default()
            .insert(other.into(), rule)
    }

    pub fn get(&self, label: &str, other: &str) -> Option<&Rule> {
        self.rules.get(label)?.get(other)
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flags, per polygon, whether a rule suppresses it.
///
/// Every ordered pair is judged against the original scores in one pass, so
/// the result does not depend on input order and a suppressed polygon still
/// counts as the "other" side for the remaining pairs.
pub fn suppressed(shapes: &[ScoredPolygon], rules: &RuleTable) -> Vec<bool> {
    let geoms: Vec<polygon::GeoPolygon> = shapes.iter().map(|s| polygon::to_geo(&s.points)).collect();
    let areas: Vec<f64> = geoms.iter().map(polygon::area).collect();
    let mut out = vec![false; shapes.len()];

    for i in 0..shapes.len() {
        for j in i + 1..shapes.len() {
            let (a, b) = (&shapes[i], &shapes[j]);
            if a.group_id == b.group_id {
                continue;
            }
            let rule_ab = rules.get(&a.label, &b.label);
            let rule_ba = rules.get(&b.label, &a.label);
            if (rule_ab.is_none() && rule_ba.is_none()) || areas[i] == 0.0 || areas[j] == 0.0 {
                continue;
            }

            let inter = polygon::intersection_area(&geoms[i], &geoms[j]);
            let (ioa_a, ioa_b) = (inter / areas[i], inter / areas[j]);
            if rule_ab.is_some_and(|r| r.fires(ioa_a, ioa_b, a.score, b.score)) {
                out[i] = true;
            }
            if rule_ba.is_some_and(|r| r.fires(ioa_b, ioa_a, b.score, a.score)) {
                out[j] = true;
            }
        }
    }
    out
}

/// Drop suppressed polygons, keeping the survivors in input order.
pub fn resolve(shapes: Vec<ScoredPolygon>, rules: &RuleTable) -> Vec<ScoredPolygon> {
    let flags = suppressed(&shapes, rules);
    shapes
        .into_iter()
        .zip(flags)
        .filter_map(|(shape, drop)| (!drop).then_some(shape))
        .collect()
}
