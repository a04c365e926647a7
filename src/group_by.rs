//! GROUP BY and aggregate accumulation.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::ast::{Aggregate, Expression};
use crate::error::Result;
use crate::evaluator::{evaluate, ExecutionContext};
use crate::pipeline::Stage;
use crate::row::{AggregateValues, Row};
use crate::types::Value;

/// One level of the grouping trie. Each level is keyed by the string form of
/// one GROUP BY value; nodes at the last level hold the group's
/// representative row, which is the first row that reached them.
#[derive(Debug, Default)]
struct GroupNode {
    children: IndexMap<String, GroupNode>,
    row: Option<Row>,
}

impl GroupNode {
    fn count(&self) -> usize {
        usize::from(self.row.is_some()) + self.children.values().map(GroupNode::count).sum::<usize>()
    }

    /// Depth-first, in the order each key was first seen.
    fn drain_into(self, out: &mut Vec<Row>) {
        if let Some(row) = self.row {
            out.push(row);
        }
        for child in self.children.into_values() {
            child.drain_into(out);
        }
    }
}

/// Barrier stage that collapses rows into groups and accumulates aggregates
/// on each group's representative row.
///
/// With no GROUP BY expressions every row belongs to one group whose
/// representative is the first row.
pub struct Group {
    keys: Vec<Expression>,
    aggregates: Vec<Aggregate>,
    root: GroupNode,
}

impl Group {
    pub fn new(keys: Vec<Expression>, aggregates: Vec<Aggregate>) -> Self {
        Group {
            keys,
            aggregates,
            root: GroupNode::default(),
        }
    }
}

fn seed(aggregates: &[Aggregate], mut row: Row) -> Row {
    let state: AggregateValues = aggregates
        .iter()
        .map(|agg| (agg.id, agg.function.initial()))
        .collect();
    row.set_aggregates(state);
    row
}

impl Stage for Group {
    fn process(&mut self, row: Row, ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        let key_values = self
            .keys
            .iter()
            .map(|key| evaluate(key, &row, ctx).map(|v| v.to_text()))
            .collect::<Result<Vec<_>>>()?;
        let inputs = self
            .aggregates
            .iter()
            .map(|agg| agg.args.first().map(|arg| evaluate(arg, &row, ctx)).transpose())
            .collect::<Result<Vec<Option<Value>>>>()?;

        let aggregates = &self.aggregates;
        let mut node = &mut self.root;
        for key in key_values.iter() {
            node = node.children.entry(key.clone()).or_default();
        }
        if node.row.is_none() {
            trace!(key = ?key_values, "new group");
        }
        let representative = node.row.get_or_insert_with(|| seed(aggregates, row));

        if let Some(state) = representative.aggregates_mut() {
            for (agg, input) in aggregates.iter().zip(inputs) {
                let (Some(input), Some(acc)) = (input, state.get_mut(&agg.id)) else {
                    continue;
                };
                let current = std::mem::replace(acc, Value::Null);
                *acc = agg.function.reduce(current, &input);
            }
        }
        Ok(Vec::new())
    }

    fn finish(&mut self, _ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        let root = std::mem::take(&mut self.root);
        let mut out = Vec::with_capacity(root.count());
        root.drain_into(&mut out);
        debug!(groups = out.len(), "group stage flushed");
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "group"
    }
}
