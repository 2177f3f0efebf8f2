//! MergeJoin: sort-merge join of two key-sorted streams.
//!
//! Both inputs must arrive sorted ascending on their join keys (nulls first,
//! see [`Value::sort_cmp`](crate::row::Value::sort_cmp)). The stage keeps one
//! cursor per side and only buffers the current run of equal right-side keys,
//! so memory stays proportional to the largest duplicate group rather than the
//! input size.
//!
//! ```text
//!   left  ─┐   compare keys   ┌─► left ⨝ right
//!          ├── advance lower ─┤
//!   right ─┘   side           └─► padded outer rows
//! ```
//!
//! Output rows are the left fields followed by the right fields. Colliding
//! right-side names are suffixed (see [`RowType::join`]).

use crate::pipeline::channel::{RowReceiver, StageOutputs};
use crate::pipeline::error::{PipelineError, PipelineResult, StageResultExt};
use crate::pipeline::stage::{InputSchemas, StageIo, Transform};
use crate::row::{Row, RowType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinType {
    #[default]
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl JoinType {
    fn keeps_left(&self) -> bool {
        matches!(self, JoinType::LeftOuter | JoinType::FullOuter)
    }

    fn keeps_right(&self) -> bool {
        matches!(self, JoinType::RightOuter | JoinType::FullOuter)
    }
}

/// # Deadlocks
///
/// The left side is read before the right. When both sides descend from one
/// fan-out stage, skewed keys can fill the right hop and stall that upstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeJoinConfig {
    /// Upstream stage feeding the left side.
    pub left_stage: String,
    /// Upstream stage feeding the right side.
    pub right_stage: String,
    pub left_keys: Vec<String>,
    pub right_keys: Vec<String>,
    #[serde(default)]
    pub join_type: JoinType,
}

pub struct MergeJoin {
    name: String,
    config: MergeJoinConfig,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    left_width: usize,
    right_width: usize,
}

/// One side of the join: the receiver and its current head row.
struct Cursor {
    rx: RowReceiver,
    head: Option<Row>,
}

impl Cursor {
    fn open(mut rx: RowReceiver) -> PipelineResult<Self> {
        let head = rx.take()?;
        Ok(Self { rx, head })
    }

    /// Replace the head with the next row and return the old head.
    fn advance(&mut self) -> PipelineResult<Option<Row>> {
        let next = self.rx.take()?;
        Ok(std::mem::replace(&mut self.head, next))
    }
}

/// Lexicographic key comparison across two layouts.
fn compare_keys(a: &Row, a_keys: &[usize], b: &Row, b_keys: &[usize]) -> Ordering {
    a_keys
        .iter()
        .zip(b_keys)
        .map(|(&i, &j)| a.value(i).sort_cmp(b.value(j)))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

impl MergeJoin {
    pub fn new(name: &str, config: MergeJoinConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            left_width: 0,
            right_width: 0,
        }
    }

    fn input_type<'a>(&self, inputs: &'a InputSchemas, stage: &str) -> PipelineResult<&'a RowType> {
        inputs
            .main_from(stage)
            .or_else(|| inputs.info_from(stage))
            .ok_or_else(|| {
                PipelineError::configuration(&self.name, format!("no input from '{}'", stage))
            })
    }

    /// Merge two sorted streams. Inputs are read strictly in key order, so
    /// any row reader works; the engine hands in channel receivers.
    fn merge(&self, left: RowReceiver, right: RowReceiver, out: &mut StageOutputs) -> PipelineResult<()> {
        let join_type = self.config.join_type;
        let left_nulls = Row::nulls(self.left_width);
        let right_nulls = Row::nulls(self.right_width);

        let mut left = Cursor::open(left)?;
        let mut right = Cursor::open(right)?;

        loop {
            let ordering = match (&left.head, &right.head) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(l), Some(r)) => compare_keys(l, &self.left_keys, r, &self.right_keys),
            };

            match ordering {
                Ordering::Less => {
                    if let Some(row) = left.advance()? {
                        if join_type.keeps_left() {
                            out.put(row.concat(&right_nulls))?;
                        }
                    }
                }
                Ordering::Greater => {
                    if let Some(row) = right.advance()? {
                        if join_type.keeps_right() {
                            out.put(left_nulls.concat(&row))?;
                        }
                    }
                }
                Ordering::Equal => {
                    let mut run = Vec::new();
                    while let Some(row) = right.head.as_ref() {
                        let same = run.first().map_or(true, |first: &Row| {
                            compare_keys(first, &self.right_keys, row, &self.right_keys)
                                == Ordering::Equal
                        });
                        if !same {
                            break;
                        }
                        if let Some(row) = right.advance()? {
                            run.push(row);
                        }
                    }

                    while let Some(row) = left.head.as_ref() {
                        if compare_keys(row, &self.left_keys, &run[0], &self.right_keys)
                            != Ordering::Equal
                        {
                            break;
                        }
                        if let Some(row) = left.advance()? {
                            for r in &run {
                                out.put(row.concat(r))?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Transform for MergeJoin {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        if self.config.left_stage == self.config.right_stage {
            return Err(PipelineError::configuration(
                &self.name,
                "left and right inputs must be different stages",
            ));
        }
        if self.config.left_keys.is_empty()
            || self.config.left_keys.len() != self.config.right_keys.len()
        {
            return Err(PipelineError::configuration(
                &self.name,
                format!(
                    "need the same non-zero number of keys on both sides, got {} and {}",
                    self.config.left_keys.len(),
                    self.config.right_keys.len()
                ),
            ));
        }

        let left = self.input_type(inputs, &self.config.left_stage)?.clone();
        let right = self.input_type(inputs, &self.config.right_stage)?.clone();

        self.left_keys = self
            .config
            .left_keys
            .iter()
            .map(|k| left.require(k))
            .collect::<Result<_, _>>()
            .config_err(&self.name)?;
        self.right_keys = self
            .config
            .right_keys
            .iter()
            .map(|k| right.require(k))
            .collect::<Result<_, _>>()
            .config_err(&self.name)?;

        for (&l, &r) in self.left_keys.iter().zip(&self.right_keys) {
            let (lf, rf) = (&left.fields()[l], &right.fields()[r]);
            if !lf.value_type.is_comparable_with(rf.value_type) {
                return Err(PipelineError::configuration(
                    &self.name,
                    format!(
                        "key '{}' ({}) cannot be compared with '{}' ({})",
                        lf.name, lf.value_type, rf.name, rf.value_type
                    ),
                ));
            }
        }

        self.left_width = left.len();
        self.right_width = right.len();
        Ok(left.join(&right))
    }

    fn execute(&mut self, io: &mut StageIo) -> PipelineResult<()> {
        let left = io.require_input(&self.config.left_stage)?;
        let right = io.require_input(&self.config.right_stage)?;
        self.merge(left, right, &mut io.outputs)
    }
}
