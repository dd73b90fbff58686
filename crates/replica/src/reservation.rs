//! All-or-nothing stock reservation for one order.

use std::time::Duration;

use catalog_store::{CatalogStore, OrderId, OrderProduct, ProductId, StockTransaction};

/// Why a reservation ended without reserving anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The product had no stock left, or does not exist.
    OutOfStock(ProductId),
    /// The store failed while the unit of work was open.
    Storage(String),
    /// The unit of work did not finish in time.
    TimedOut(Duration),
}

impl AbortReason {
    fn metric_label(&self) -> &'static str {
        match self {
            AbortReason::OutOfStock(_) => "out_of_stock",
            AbortReason::Storage(_) => "storage_error",
            AbortReason::TimedOut(_) => "timed_out",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::OutOfStock(id) => write!(f, "product {id} is out of stock"),
            AbortReason::Storage(e) => write!(f, "storage failure: {e}"),
            AbortReason::TimedOut(d) => write!(f, "unit of work timed out after {d:?}"),
        }
    }
}

/// The state of one reservation attempt.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Reserved { units }
///           └──► Aborted(reason)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReservationState {
    /// Nothing has been attempted yet.
    #[default]
    Pending,
    /// Every requested unit was decremented and recorded (terminal state).
    Reserved { units: usize },
    /// Nothing was changed (terminal state).
    Aborted(AbortReason),
}

impl ReservationState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationState::Pending)
    }
}

/// Reserves one unit of stock per requested product id, or none at all.
#[derive(Debug, Clone)]
pub struct Reservation {
    order_id: OrderId,
    product_ids: Vec<ProductId>,
    state: ReservationState,
}

impl Reservation {
    /// Creates a pending reservation. Repeated product ids reserve one unit each.
    pub fn new(order_id: OrderId, product_ids: Vec<ProductId>) -> Self {
        Self {
            order_id,
            product_ids,
            state: ReservationState::Pending,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn state(&self) -> &ReservationState {
        &self.state
    }

    /// Runs the reservation inside one unit of work bounded by `timeout`.
    ///
    /// The bound covers every step up to the commit. Once the commit has been
    /// issued it is awaited to completion, so the recorded state always
    /// matches what the store holds. The order stub must already exist. A
    /// terminal reservation is not run again.
    #[tracing::instrument(skip(self, store), fields(order_id = %self.order_id, requested = self.product_ids.len()))]
    pub async fn execute<S>(&mut self, store: &S, timeout: Duration) -> &ReservationState
    where
        S: CatalogStore + ?Sized,
    {
        if self.state.is_terminal() {
            return &self.state;
        }

        let staging = stage_all(store, self.order_id, &self.product_ids);
        self.state = match tokio::time::timeout(timeout, staging).await {
            Ok(Ok((tx, units))) => match tx.commit().await {
                Ok(()) => ReservationState::Reserved { units },
                Err(e) => ReservationState::Aborted(storage(e)),
            },
            Ok(Err(reason)) => ReservationState::Aborted(reason),
            // Dropping the staging future drops its transaction, which discards it.
            Err(_) => ReservationState::Aborted(AbortReason::TimedOut(timeout)),
        };

        match &self.state {
            ReservationState::Reserved { units } => {
                metrics::counter!("stock_reservations_total", "result" => "reserved").increment(1);
                tracing::info!(units, "stock reserved");
            }
            ReservationState::Aborted(reason) => {
                metrics::counter!("stock_reservations_total", "result" => reason.metric_label())
                    .increment(1);
                match reason {
                    AbortReason::OutOfStock(_) => {
                        tracing::info!(%reason, "reservation rolled back")
                    }
                    _ => tracing::error!(%reason, "reservation aborted"),
                }
            }
            ReservationState::Pending => {}
        }

        &self.state
    }
}

/// Decrements and records every unit inside an open transaction, leaving the
/// commit to the caller.
async fn stage_all<S>(
    store: &S,
    order_id: OrderId,
    product_ids: &[ProductId],
) -> Result<(Box<dyn StockTransaction>, usize), AbortReason>
where
    S: CatalogStore + ?Sized,
{
    let mut tx = store.begin().await.map_err(storage)?;
    let mut staged = Vec::with_capacity(product_ids.len());

    for &product_id in product_ids {
        match tx.decrement_stock(product_id).await {
            Ok(true) => staged.push(OrderProduct::new(order_id, product_id)),
            Ok(false) => {
                discard(tx).await;
                return Err(AbortReason::OutOfStock(product_id));
            }
            Err(e) => {
                discard(tx).await;
                return Err(storage(e));
            }
        }
    }

    if let Err(e) = tx.insert_order_products(&staged).await {
        discard(tx).await;
        return Err(storage(e));
    }

    Ok((tx, staged.len()))
}

async fn discard(tx: Box<dyn StockTransaction>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}

fn storage(e: catalog_store::StoreError) -> AbortReason {
    AbortReason::Storage(e.to_string())
}
