//! Status Transition Authority: every status change after checkout goes
//! through here.

use common::{ItemStatus, OrderId, OrderItemId};
use store::{CommerceStore, CommerceStoreExt, ItemTransition, StoredOrder};

use super::transition::{Actor, check_item_transition, plan_order_transition};
use super::{OrderStatus, OrderView};
use crate::caller::Caller;
use crate::error::DomainError;

/// Applies customer cancellations and admin fulfilment moves.
///
/// Each call is validated against the order as it stands, then written as
/// guarded item transitions in a single store transaction. Items entering
/// `Cancelled` or `Returned` give their quantity back to stock in that same
/// transaction, exactly once.
#[derive(Clone)]
pub struct StatusAuthority<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> StatusAuthority<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn load_for(
        &self,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<StoredOrder, DomainError> {
        let stored = self.store.require_order(order_id).await?;
        caller.ensure_owner_or_admin(stored.order.customer_id)?;
        Ok(stored)
    }

    /// Cancels every cancellable item of an order.
    ///
    /// Customers may cancel only while the order is `Pending`; admins also
    /// while it is `Processing`.
    #[tracing::instrument(skip(self, caller), fields(customer_id = %caller.customer_id))]
    pub async fn cancel_order(
        &self,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<OrderView, DomainError> {
        let stored = self.load_for(caller, order_id).await?;
        let actor = Actor::from(caller);

        let current = OrderStatus::derive(stored.items.iter().map(|item| item.status));
        if actor == Actor::Customer && current != OrderStatus::Pending {
            return Err(DomainError::InvalidTransition {
                subject: "order",
                from: current.to_string(),
                to: ItemStatus::Cancelled,
            });
        }

        let plan = plan_order_transition(&stored.items, ItemStatus::Cancelled, actor)?;
        self.apply(order_id, plan).await
    }

    /// Cancels a single item.
    #[tracing::instrument(skip(self, caller), fields(customer_id = %caller.customer_id))]
    pub async fn cancel_item(
        &self,
        caller: &Caller,
        order_id: OrderId,
        item_id: OrderItemId,
    ) -> Result<OrderView, DomainError> {
        let stored = self.load_for(caller, order_id).await?;
        let transition = Self::item_move(&stored, item_id, ItemStatus::Cancelled, caller.into())?;
        self.apply(order_id, vec![transition]).await
    }

    /// Moves every non-terminal item of an order to `to`. Admin only.
    #[tracing::instrument(skip(self, caller))]
    pub async fn set_order_status(
        &self,
        caller: &Caller,
        order_id: OrderId,
        to: ItemStatus,
    ) -> Result<OrderView, DomainError> {
        caller.ensure_admin()?;
        let stored = self.store.require_order(order_id).await?;
        let plan = plan_order_transition(&stored.items, to, Actor::Admin)?;
        self.apply(order_id, plan).await
    }

    /// Moves a single item to `to`. Admin only.
    #[tracing::instrument(skip(self, caller))]
    pub async fn set_item_status(
        &self,
        caller: &Caller,
        order_id: OrderId,
        item_id: OrderItemId,
        to: ItemStatus,
    ) -> Result<OrderView, DomainError> {
        caller.ensure_admin()?;
        let stored = self.store.require_order(order_id).await?;
        let transition = Self::item_move(&stored, item_id, to, Actor::Admin)?;
        self.apply(order_id, vec![transition]).await
    }

    fn item_move(
        stored: &StoredOrder,
        item_id: OrderItemId,
        to: ItemStatus,
        actor: Actor,
    ) -> Result<ItemTransition, DomainError> {
        let item = stored
            .items
            .iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| DomainError::not_found("OrderItem", item_id))?;
        check_item_transition(item.status, to, actor)?;
        Ok(ItemTransition {
            item_id,
            from: item.status,
            to,
        })
    }

    async fn apply(
        &self,
        order_id: OrderId,
        transitions: Vec<ItemTransition>,
    ) -> Result<OrderView, DomainError> {
        let moved: Vec<ItemTransition> = transitions.clone();
        let stored = self.store.apply_item_transitions(order_id, transitions).await?;

        let mut released = 0u64;
        for transition in &moved {
            metrics::counter!("item_transitions_total", "to" => transition.to.as_str()).increment(1);
            if !transition.to.releases_stock() {
                continue;
            }
            if let Some(item) = stored.items.iter().find(|i| i.id == transition.item_id) {
                released += u64::from(item.quantity);
            }
        }
        if released > 0 {
            metrics::counter!("stock_released_units_total").increment(released);
        }

        let view = OrderView::from(stored);
        tracing::info!(
            items = moved.len(),
            released,
            status = %view.status,
            "Order items transitioned"
        );
        Ok(view)
    }
}
