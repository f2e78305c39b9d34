//! Execution boundary.
//!
//! The core never talks to a broker. It hands [`OrderRequest`]s to an
//! adapter and later observes a terminal [`OrderResult`]; retries, transport
//! and authentication all live on the adapter's side.

use crate::domain::{OrderRequest, OrderResult, Position};

pub trait ExecutionAdapter: Send {
    /// Place an order and return its terminal result.
    fn submit_order(&mut self, request: &OrderRequest) -> OrderResult;

    /// Positions the venue believes are open.
    fn open_positions(&self) -> Vec<Position>;
}

impl<A: ExecutionAdapter + ?Sized> ExecutionAdapter for Box<A> {
    fn submit_order(&mut self, request: &OrderRequest) -> OrderResult {
        (**self).submit_order(request)
    }

    fn open_positions(&self) -> Vec<Position> {
        (**self).open_positions()
    }
}
