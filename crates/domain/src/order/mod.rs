//! Orders: placement, derived status and the status transition authority.

mod authority;
mod engine;
mod status;
mod transition;
mod view;

pub use authority::StatusAuthority;
pub use engine::{OrderEngine, PlaceOrder};
pub use status::OrderStatus;
pub use transition::{Actor, check_item_transition, plan_order_transition};
pub use view::OrderView;
