//! Shared application state.

use std::sync::Arc;

use domain::{CartPolicy, CartService, CatalogService, OrderEngine, StatusAuthority};
use store::CommerceStore;

/// The services every handler draws from, all over one store handle.
pub struct AppState<S: CommerceStore> {
    pub catalog: CatalogService<S>,
    pub cart: CartService<S>,
    pub orders: OrderEngine<S>,
    pub authority: StatusAuthority<S>,
}

impl<S: CommerceStore + Clone> AppState<S> {
    pub fn new(store: S, policy: CartPolicy) -> Arc<Self> {
        let cart = CartService::new(store.clone(), policy);
        Arc::new(Self {
            catalog: CatalogService::new(store.clone()),
            orders: OrderEngine::new(store.clone(), cart.clone()),
            authority: StatusAuthority::new(store),
            cart,
        })
    }
}
