//! The legal status graph for items, and how an order-level move cascades
//! onto its items.

use common::ItemStatus;
use store::{ItemTransition, OrderItemRecord};

use super::OrderStatus;
use crate::caller::Caller;
use crate::error::DomainError;

/// Who is asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer,
    Admin,
}

impl From<&Caller> for Actor {
    fn from(caller: &Caller) -> Self {
        if caller.is_admin {
            Actor::Admin
        } else {
            Actor::Customer
        }
    }
}

/// Item-level graph:
///
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered
///    │                          │
///    ▼                          ▼
/// Cancelled                  Returned
/// (anyone)                   (admin)
/// ```
fn allowed(from: ItemStatus, to: ItemStatus, actor: Actor) -> bool {
    use common::ItemStatus::*;

    match (from, to) {
        (Pending, Cancelled) => true,
        (Pending, Processing)
        | (Processing, Shipped)
        | (Shipped, Delivered)
        | (Shipped, Returned) => actor == Actor::Admin,
        _ => false,
    }
}

/// The item graph plus the edges only an order-level move may take.
///
/// An admin cancelling a `Processing` order cancels its `Processing` items;
/// a single `Processing` item cannot be cancelled on its own.
fn cascades(from: ItemStatus, to: ItemStatus, actor: Actor) -> bool {
    let order_cancel =
        from == ItemStatus::Processing && to == ItemStatus::Cancelled && actor == Actor::Admin;
    order_cancel || allowed(from, to, actor)
}

/// Checks a single item move. Illegal moves fail with `InvalidTransition`.
pub fn check_item_transition(
    from: ItemStatus,
    to: ItemStatus,
    actor: Actor,
) -> Result<(), DomainError> {
    if allowed(from, to, actor) {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition {
            subject: "item",
            from: from.to_string(),
            to,
        })
    }
}

/// Plans an order-level move as guarded item transitions.
///
/// Terminal items are left alone, as are items already in `to`. The move is
/// legal only if at least one item moves and every other non-terminal item
/// can make the same move; otherwise nothing is planned.
pub fn plan_order_transition(
    items: &[OrderItemRecord],
    to: ItemStatus,
    actor: Actor,
) -> Result<Vec<ItemTransition>, DomainError> {
    let rejected = || DomainError::InvalidTransition {
        subject: "order",
        from: OrderStatus::derive(items.iter().map(|item| item.status)).to_string(),
        to,
    };

    let mut planned = Vec::new();
    for item in items
        .iter()
        .filter(|item| !item.status.is_terminal() && item.status != to)
    {
        if !cascades(item.status, to, actor) {
            return Err(rejected());
        }
        planned.push(ItemTransition {
            item_id: item.id,
            from: item.status,
            to,
        });
    }

    if planned.is_empty() {
        return Err(rejected());
    }
    Ok(planned)
}
