// Domain entities
pub mod location;
pub mod lot;
pub mod operation;
pub mod order;
pub mod order_line;
pub mod quant;
pub mod reservation;

pub use location::{Location, LocationUsage};
pub use lot::Lot;
pub use operation::{Operation, OperationKind, OperationState};
pub use order::{Order, OrderState};
pub use order_line::OrderLine;
pub use quant::Quant;
pub use reservation::Reservation;
