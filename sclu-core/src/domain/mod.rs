//! Domain types for the SCLU engine

pub mod bar;
pub mod instrument;
pub mod order;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use instrument::{Instrument, InstrumentError};
pub use order::{OrderId, OrderRequest, OrderResult, OrderSide, OrderStatus, OrderType};
pub use position::{OptionSide, Position, PositionState, RallyKind};
pub use trade::{ExitReason, TradeRecord};
