//! OFFSET and LIMIT.

use tracing::debug;

use crate::error::Result;
use crate::evaluator::ExecutionContext;
use crate::pipeline::Stage;
use crate::row::Row;

/// Drops the first `offset` rows.
pub struct Offset {
    offset: u64,
    seen: u64,
}

impl Offset {
    pub fn new(offset: u64) -> Self {
        Offset { offset, seen: 0 }
    }
}

impl Stage for Offset {
    fn process(&mut self, row: Row, _ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        self.seen += 1;
        if self.seen > self.offset {
            Ok(vec![row])
        } else {
            Ok(Vec::new())
        }
    }

    fn name(&self) -> &'static str {
        "offset"
    }
}

/// Passes the first `limit` rows and drops the rest.
///
/// The first dropped row triggers `on_terminate`, telling the driver that
/// the row source can be closed. It is called at most once.
pub struct Limit {
    limit: u64,
    passed: u64,
    on_terminate: Option<Box<dyn FnMut()>>,
}

impl Limit {
    pub fn new(limit: u64, on_terminate: impl FnMut() + 'static) -> Self {
        Limit {
            limit,
            passed: 0,
            on_terminate: Some(Box::new(on_terminate)),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.on_terminate.is_none()
    }
}

impl Stage for Limit {
    fn process(&mut self, row: Row, _ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        if self.passed < self.limit {
            self.passed += 1;
            return Ok(vec![row]);
        }
        if let Some(mut terminate) = self.on_terminate.take() {
            debug!(limit = self.limit, "limit reached, ending input");
            terminate();
        }
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "limit"
    }
}
