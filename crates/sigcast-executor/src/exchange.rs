//! Execution client adapter seam.
//!
//! The remote exchange is an external collaborator. The engine only talks to
//! it through [`ExchangeClient`]; credentials are resolved by the adapter
//! from the subscriber's opaque [`CredentialRef`](sigcast_core::CredentialRef).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigcast_core::{Amount, Leverage, OrderKind, OrderSide, Price, Subscriber, Symbol};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ExchangeResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Exchange-assigned order reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderRef(pub String);

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order to place for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Quote-currency margin committed; leverage is set beforehand.
    pub quantity: Amount,
    /// Present exactly for LIMIT orders.
    pub price: Option<Price>,
}

/// Operations the engine needs from the exchange.
pub trait ExchangeClient: Send + Sync {
    fn has_open_position<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, ExchangeResult<bool>>;

    fn get_balance<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, ExchangeResult<Amount>>;

    fn set_leverage<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        symbol: &'a Symbol,
        leverage: Leverage,
    ) -> BoxFuture<'a, ExchangeResult<()>>;

    fn place_order<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        order: OrderRequest,
    ) -> BoxFuture<'a, ExchangeResult<OrderRef>>;

    fn set_stop_loss_take_profit<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        symbol: &'a Symbol,
        stop_loss: Option<Price>,
        take_profit: Option<Price>,
    ) -> BoxFuture<'a, ExchangeResult<()>>;

    /// Close `percentage` (0, 100] of the open position.
    fn close_position<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        symbol: &'a Symbol,
        percentage: Decimal,
    ) -> BoxFuture<'a, ExchangeResult<OrderRef>>;
}

/// Arc wrapper for ExchangeClient trait objects.
pub type DynExchangeClient = Arc<dyn ExchangeClient>;
