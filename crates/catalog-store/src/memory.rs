use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    CatalogStore, CustomerId, NewProduct, OrderId, OrderProduct, Product, ProductId, Result,
    StockTransaction, StoreError,
};

#[derive(Debug, Default)]
struct CatalogState {
    products: BTreeMap<ProductId, Product>,
    next_product_id: i64,
    customers: BTreeSet<CustomerId>,
    orders: BTreeSet<OrderId>,
    order_products: Vec<OrderProduct>,
}

/// In-memory catalog store implementation for testing.
///
/// Provides the same interface as the PostgreSQL implementation, including
/// the foreign key checks on order-product rows. A [`StockTransaction`]
/// holds the store lock until it is committed or dropped, so other callers
/// never observe a half-applied reservation.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    state: Arc<Mutex<CatalogState>>,
    fail_on_commit: Arc<AtomicBool>,
    commit_delay_ms: Arc<AtomicU64>,
}

impl InMemoryCatalogStore {
    /// Creates a new empty in-memory catalog store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail every subsequent commit.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent commit wait before applying its changes.
    pub fn set_commit_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.commit_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Returns the total number of order-product rows.
    pub async fn order_product_count(&self) -> usize {
        self.state.lock().await.order_products.len()
    }

}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let mut state = self.state.lock().await;
        state.next_product_id += 1;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(state.next_product_id),
            name: product.name,
            stock: product.stock,
            details: product.details,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.lock().await.products.values().cloned().collect())
    }

    async fn replace_product(
        &self,
        id: ProductId,
        product: NewProduct,
    ) -> Result<Option<Product>> {
        let mut state = self.state.lock().await;
        let Some(existing) = state.products.get_mut(&id) else {
            return Ok(None);
        };
        existing.name = product.name;
        existing.stock = product.stock;
        existing.details = product.details;
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>> {
        let mut state = self.state.lock().await;
        let removed = state.products.remove(&id);
        if removed.is_some() {
            state.order_products.retain(|row| row.product_id != id);
        }
        Ok(removed)
    }

    async fn products_for_order(&self, order_id: OrderId) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(state
            .order_products
            .iter()
            .filter(|row| row.order_id == order_id)
            .filter_map(|row| state.products.get(&row.product_id).cloned())
            .collect())
    }

    async fn insert_customer(&self, id: CustomerId) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.customers.insert(id) {
            return Err(StoreError::Duplicate {
                entity: "customer",
                id: id.as_i64(),
            });
        }
        Ok(())
    }

    async fn upsert_customer(&self, id: CustomerId) -> Result<()> {
        self.state.lock().await.customers.insert(id);
        Ok(())
    }

    async fn delete_customer(&self, id: CustomerId) -> Result<u64> {
        Ok(u64::from(self.state.lock().await.customers.remove(&id)))
    }

    async fn customer_exists(&self, id: CustomerId) -> Result<bool> {
        Ok(self.state.lock().await.customers.contains(&id))
    }

    async fn upsert_order(&self, id: OrderId) -> Result<bool> {
        Ok(self.state.lock().await.orders.insert(id))
    }

    async fn delete_order(&self, id: OrderId) -> Result<u64> {
        let mut state = self.state.lock().await;
        let removed = state.orders.remove(&id);
        if removed {
            state.order_products.retain(|row| row.order_id != id);
        }
        Ok(u64::from(removed))
    }

    async fn order_exists(&self, id: OrderId) -> Result<bool> {
        Ok(self.state.lock().await.orders.contains(&id))
    }

    async fn order_products(&self, order_id: OrderId) -> Result<Vec<OrderProduct>> {
        let state = self.state.lock().await;
        Ok(state
            .order_products
            .iter()
            .filter(|row| row.order_id == order_id)
            .copied()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn StockTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(InMemoryStockTransaction {
            guard,
            decrements: HashMap::new(),
            staged_rows: Vec::new(),
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
            commit_delay: Duration::from_millis(self.commit_delay_ms.load(Ordering::SeqCst)),
        }))
    }
}

/// Unit of work over the in-memory state.
///
/// Changes are staged next to the locked state and applied on commit.
struct InMemoryStockTransaction {
    guard: OwnedMutexGuard<CatalogState>,
    decrements: HashMap<ProductId, u32>,
    staged_rows: Vec<OrderProduct>,
    fail_on_commit: bool,
    commit_delay: Duration,
}

#[async_trait]
impl StockTransaction for InMemoryStockTransaction {
    async fn decrement_stock(&mut self, product_id: ProductId) -> Result<bool> {
        let Some(product) = self.guard.products.get(&product_id) else {
            return Ok(false);
        };
        let taken = self.decrements.entry(product_id).or_insert(0);
        if product.stock > *taken {
            *taken += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn insert_order_products(&mut self, rows: &[OrderProduct]) -> Result<()> {
        for row in rows {
            if !self.guard.orders.contains(&row.order_id) {
                return Err(StoreError::ForeignKey(format!(
                    "order {} does not exist",
                    row.order_id
                )));
            }
            if !self.guard.products.contains_key(&row.product_id) {
                return Err(StoreError::ForeignKey(format!(
                    "product {} does not exist",
                    row.product_id
                )));
            }
        }
        self.staged_rows.extend_from_slice(rows);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }
        if self.fail_on_commit {
            return Err(StoreError::Commit("commit rejected by test store".to_string()));
        }

        let InMemoryStockTransaction {
            mut guard,
            decrements,
            staged_rows,
            ..
        } = *self;

        let now = Utc::now();
        for (product_id, taken) in decrements {
            if let Some(product) = guard.products.get_mut(&product_id) {
                product.stock -= taken;
                product.updated_at = now;
            }
        }
        guard.order_products.extend(staged_rows);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_product(stock: u32) -> (InMemoryCatalogStore, ProductId) {
        let store = InMemoryCatalogStore::new();
        let product = store
            .create_product(NewProduct::new("Arabica", stock))
            .await
            .unwrap();
        (store, product.id)
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = InMemoryCatalogStore::new();
        let a = store.create_product(NewProduct::new("A", 1)).await.unwrap();
        let b = store.create_product(NewProduct::new("B", 2)).await.unwrap();
        assert_eq!(a.id, ProductId::new(1));
        assert_eq!(b.id, ProductId::new(2));
        assert_eq!(store.list_products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_and_delete_missing_product() {
        let store = InMemoryCatalogStore::new();
        let missing = ProductId::new(99);
        assert!(
            store
                .replace_product(missing, NewProduct::new("X", 1))
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.delete_product(missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_customer_insert_fails() {
        let store = InMemoryCatalogStore::new();
        let id = CustomerId::new(1);
        store.insert_customer(id).await.unwrap();
        let err = store.insert_customer(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "customer", id: 1 }));
    }

    #[tokio::test]
    async fn test_delete_absent_stub_affects_zero_rows() {
        let store = InMemoryCatalogStore::new();
        assert_eq!(store.delete_customer(CustomerId::new(5)).await.unwrap(), 0);
        assert_eq!(store.delete_order(OrderId::new(5)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_order_reports_creation() {
        let store = InMemoryCatalogStore::new();
        assert!(store.upsert_order(OrderId::new(1)).await.unwrap());
        assert!(!store.upsert_order(OrderId::new(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_decrement_stops_at_zero() {
        let (store, id) = store_with_product(2).await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.decrement_stock(id).await.unwrap());
        assert!(tx.decrement_stock(id).await.unwrap());
        assert!(!tx.decrement_stock(id).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_decrement_unknown_product_returns_false() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(!tx.decrement_stock(ProductId::new(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_changes() {
        let (store, id) = store_with_product(3).await;
        store.upsert_order(OrderId::new(1)).await.unwrap();
        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.decrement_stock(id).await.unwrap());
            tx.insert_order_products(&[OrderProduct::new(OrderId::new(1), id)])
                .await
                .unwrap();
        }

        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 3);
        assert_eq!(store.order_product_count().await, 0);
    }

    #[tokio::test]
    async fn test_order_products_require_existing_order() {
        let (store, id) = store_with_product(1).await;
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_order_products(&[OrderProduct::new(OrderId::new(8), id)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey(_)));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_state_untouched() {
        let (store, id) = store_with_product(1).await;
        store.set_fail_on_commit(true);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.decrement_stock(id).await.unwrap());
        assert!(tx.commit().await.is_err());

        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn test_products_for_order_lists_each_unit() {
        let (store, id) = store_with_product(5).await;
        let order_id = OrderId::new(3);
        store.upsert_order(order_id).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order_products(&[
            OrderProduct::new(order_id, id),
            OrderProduct::new(order_id, id),
        ])
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.products_for_order(order_id).await.unwrap().len(), 2);

        store.delete_order(order_id).await.unwrap();
        assert!(store.order_products(order_id).await.unwrap().is_empty());
    }
}
