//! Projection of the output columns.

use crate::ast::SelectList;
use crate::error::Result;
use crate::evaluator::{evaluate, ExecutionContext};
use crate::pipeline::Stage;
use crate::row::Row;

pub struct Project {
    select: SelectList,
}

impl Project {
    pub fn new(select: SelectList) -> Self {
        Project { select }
    }
}

impl Stage for Project {
    fn process(&mut self, mut row: Row, ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        let out = match &self.select {
            SelectList::Star => {
                row.strip_aggregates();
                row
            }
            SelectList::Columns(columns) => {
                let mut out = Row::with_capacity(columns.len());
                for column in columns {
                    out.insert(column.name.clone(), evaluate(&column.expr, &row, ctx)?);
                }
                out
            }
        };
        Ok(vec![out])
    }

    fn name(&self) -> &'static str {
        "select"
    }
}
