//! Query execution as a chain of push-based row stages.
//!
//! Streaming stages (filter, offset, limit, projection) emit at most one row
//! per input row. Barrier stages (grouping, ordering) buffer everything and
//! emit only from [`Stage::finish`].

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{Expression, Query};
use crate::error::Result;
use crate::evaluator::{evaluate, ExecutionContext};
use crate::group_by::Group;
use crate::limit::{Limit, Offset};
use crate::order_by::Order;
use crate::row::Row;
use crate::select::Project;

/// One transform in the pipeline.
pub trait Stage {
    /// Consume one row, returning the rows to pass downstream.
    fn process(&mut self, row: Row, ctx: &mut ExecutionContext) -> Result<Vec<Row>>;

    /// Called once after the last input row.
    fn finish(&mut self, _ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str;
}

/// WHERE / HAVING: keep rows for which the condition is truthy.
pub struct Filter {
    condition: Expression,
    name: &'static str,
}

impl Filter {
    pub fn new(condition: Expression, name: &'static str) -> Self {
        Filter { condition, name }
    }
}

impl Stage for Filter {
    fn process(&mut self, row: Row, ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        if evaluate(&self.condition, &row, ctx)?.is_truthy() {
            Ok(vec![row])
        } else {
            Ok(Vec::new())
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Destination for the rows a query produces.
pub trait RowSink {
    fn write_row(&mut self, row: Row) -> Result<()>;

    /// Called once after the last row.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RowSink for Vec<Row> {
    fn write_row(&mut self, row: Row) -> Result<()> {
        self.push(row);
        Ok(())
    }
}

/// The stages for one query execution, plus the context they share.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    ctx: ExecutionContext,
}

impl Pipeline {
    /// Build the pipeline for a query whose aggregates have been identified.
    pub fn new(query: &Query) -> Self {
        Self::with_termination(query, || {})
    }

    /// Like [`Pipeline::new`], with a callback that LIMIT invokes once it
    /// has all the rows it will ever pass on.
    pub fn with_termination(query: &Query, on_terminate: impl FnMut() + 'static) -> Self {
        let mut stages: Vec<Box<dyn Stage>> = Vec::new();

        if let Some(condition) = &query.where_clause {
            stages.push(Box::new(Filter::new(condition.clone(), "where")));
        }
        if query.needs_grouping() {
            stages.push(Box::new(Group::new(
                query.group_by.clone().unwrap_or_default(),
                query.aggregates.clone(),
            )));
        }
        if let Some(condition) = &query.having {
            stages.push(Box::new(Filter::new(condition.clone(), "having")));
        }
        if let Some(terms) = &query.order_by {
            stages.push(Box::new(Order::new(terms.clone())));
        }
        if let Some(offset) = query.offset {
            stages.push(Box::new(Offset::new(offset)));
        }
        if let Some(limit) = query.limit {
            stages.push(Box::new(Limit::new(limit, on_terminate)));
        }
        stages.push(Box::new(Project::new(query.select.clone())));

        let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
        debug!(stages = ?names, "built pipeline");

        Pipeline {
            stages,
            ctx: ExecutionContext::new(),
        }
    }

    /// Feed one source row through every stage.
    pub fn push(&mut self, row: Row) -> Result<Vec<Row>> {
        let mut rows = vec![row];
        for stage in self.stages.iter_mut() {
            if rows.is_empty() {
                break;
            }
            let mut next = Vec::with_capacity(rows.len());
            for row in rows {
                next.extend(stage.process(row, &mut self.ctx)?);
            }
            rows = next;
        }
        Ok(rows)
    }

    /// Signal end of input, flushing each stage into the ones after it.
    pub fn finish(&mut self) -> Result<Vec<Row>> {
        let mut carried = Vec::new();
        for stage in self.stages.iter_mut() {
            let mut next = Vec::with_capacity(carried.len());
            for row in carried {
                next.extend(stage.process(row, &mut self.ctx)?);
            }
            next.extend(stage.finish(&mut self.ctx)?);
            carried = next;
        }
        Ok(carried)
    }
}

/// Run `query` over `source`, writing results to `sink`.
///
/// The source is dropped as soon as LIMIT signals that no further input
/// is needed.
pub fn run<I, S>(query: &Query, source: I, sink: &mut S) -> Result<()>
where
    I: IntoIterator<Item = Result<Row>>,
    S: RowSink + ?Sized,
{
    let stopped = Rc::new(Cell::new(false));
    let flag = Rc::clone(&stopped);
    let mut pipeline = Pipeline::with_termination(query, move || flag.set(true));

    let mut rows_read = 0u64;
    for row in source {
        rows_read += 1;
        for out in pipeline.push(row?)? {
            sink.write_row(out)?;
        }
        if stopped.get() {
            debug!(rows_read, "stopped reading source early");
            break;
        }
    }

    for out in pipeline.finish()? {
        sink.write_row(out)?;
    }
    sink.finish()
}
