//! Order workflow - cart to priced order, and fulfillment.
//!
//! This service handles:
//! - Cart validation and contact snapshotting
//! - Authoritative repricing from the catalog
//! - Currency consistency and server-side totals
//! - Stock decrement on fulfillment
//!
//! # Atomicity Guarantees
//!
//! Order placement (insert + order counters) and fulfillment (flag + stock)
//! each run in one store transaction. Any error drops the transaction handle,
//! which rolls everything back.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    order::{CartLine, CreateOrderRequest, NewOrder, Order, OrderItem},
    perfume::StockLevel,
    user::{GUEST_DISPLAY_NAME, Identity},
};
use crate::store::{CatalogStore, CredentialStore};

const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;

/// Largest total the `orders.total` column (NUMERIC(14, 2)) can hold.
fn max_order_total() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// A phone number is plausible when it has 10-15 digits once everything else is stripped.
pub fn is_valid_phone(value: &str) -> bool {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
}

/// Keep only lines with a non-empty id and a positive quantity.
fn orderable_lines(lines: Vec<CartLine>) -> Vec<CartLine> {
    lines
        .into_iter()
        .map(|mut line| {
            line.id = line.id.trim().to_string();
            line
        })
        .filter(|line| !line.id.is_empty() && line.qty > 0)
        .collect()
}

/// Sum quantities per perfume id.
fn quantities_by_id(items: &[OrderItem]) -> BTreeMap<&str, i64> {
    let mut counts = BTreeMap::new();
    for item in items.iter().filter(|i| !i.id.is_empty() && i.qty > 0) {
        *counts.entry(item.id.as_str()).or_insert(0) += i64::from(item.qty);
    }
    counts
}

#[derive(Clone)]
pub struct OrderWorkflow {
    catalog: Arc<dyn CatalogStore>,
    users: Arc<dyn CredentialStore>,
    default_currency: String,
}

impl OrderWorkflow {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        users: Arc<dyn CredentialStore>,
        default_currency: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            users,
            default_currency: default_currency.into(),
        }
    }

    /// Place an order for `identity`.
    ///
    /// # Process
    ///
    /// 1. Reject empty carts; guests must leave a plausible phone
    /// 2. Snapshot contact details (account profile, overridden by request)
    /// 3. Drop lines with empty id or non-positive quantity
    /// 4. Open a transaction and reprice every line from the catalog
    /// 5. Insert the order and bump each perfume's order counter
    /// 6. Commit
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: empty order, invalid phone, unknown perfume, mixed currency,
    ///   total too large to store
    /// - `Unauthenticated`: the registered caller no longer exists
    /// - `Store`: store failure (nothing is written)
    pub async fn create_order(
        &self,
        identity: &Identity,
        request: CreateOrderRequest,
    ) -> Result<Order, AppError> {
        if request.items.is_empty() {
            return Err(AppError::InvalidInput("empty order".to_string()));
        }

        let phone = request.contact.phone.trim().to_string();
        if identity.is_anonymous && !is_valid_phone(&phone) {
            return Err(AppError::InvalidInput("invalid phone".to_string()));
        }

        // Contact snapshot. Loaded before the catalog transaction opens.
        let (mut display_name, mut email) = if identity.is_anonymous {
            (GUEST_DISPLAY_NAME.to_string(), String::new())
        } else {
            let user = self
                .users
                .find_user_by_id(&identity.user_id)
                .await?
                .ok_or(AppError::Unauthenticated)?;
            (
                user.display_name.unwrap_or_default(),
                user.email.unwrap_or_default(),
            )
        };
        let contact_name = request.contact.name.trim();
        if !contact_name.is_empty() {
            display_name = contact_name.to_string();
        }
        let contact_email = request.contact.email.trim();
        if !contact_email.is_empty() {
            email = contact_email.to_string();
        }

        let lines = orderable_lines(request.items);
        if lines.is_empty() {
            return Err(AppError::InvalidInput("empty order".to_string()));
        }

        let mut tx = self.catalog.begin_catalog().await?;

        let mut ids: Vec<String> = lines.iter().map(|l| l.id.clone()).collect();
        ids.sort();
        ids.dedup();
        let catalog: HashMap<String, _> = tx
            .find_perfumes(&ids)
            .await?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        let mut currency: Option<String> = None;
        let mut total = Decimal::ZERO;
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            let pricing = catalog
                .get(&line.id)
                .ok_or_else(|| AppError::InvalidInput(format!("invalid perfume id: {}", line.id)))?
                .pricing()
                .ok_or_else(|| AppError::InvalidInput(format!("perfume has no price: {}", line.id)))?;

            if !pricing.currency.is_empty() {
                match &currency {
                    None => currency = Some(pricing.currency.clone()),
                    Some(existing) if *existing != pricing.currency => {
                        return Err(AppError::InvalidInput("mixed currency".to_string()));
                    }
                    Some(_) => {}
                }
            }

            let item = OrderItem {
                id: line.id,
                qty: line.qty,
                volume: line.volume,
                mix: line.mix,
                price: pricing.price,
            };
            total += item.line_total();
            items.push(item);
        }

        if total > max_order_total() {
            return Err(AppError::InvalidInput("order total out of range".to_string()));
        }

        let currency = currency.unwrap_or_else(|| self.default_currency.clone());
        let counts: Vec<(String, i64)> = quantities_by_id(&items)
            .into_iter()
            .map(|(id, qty)| (id.to_string(), qty))
            .collect();

        let order = tx
            .insert_order(NewOrder {
                user_id: (!identity.is_anonymous).then(|| identity.user_id.clone()),
                is_anonymous: identity.is_anonymous,
                email,
                display_name,
                phone,
                items,
                total,
                currency,
                channel: request.channel.trim().to_string(),
                delivery_method: request.delivery.method.trim().to_string(),
                delivery_address: request.delivery.address.trim().to_string(),
            })
            .await?;

        for (perfume_id, qty) in &counts {
            tx.increment_order_count(perfume_id, *qty).await?;
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            user_id = %identity.user_id,
            lines = order.items.0.len(),
            total = %order.total,
            currency = %order.currency,
            "order placed"
        );

        Ok(order)
    }

    /// Set the fulfilled flag of an order.
    ///
    /// Only the false → true transition touches stock: each finite stock is
    /// decremented by the ordered quantity, floored at zero, and a perfume
    /// that reaches zero is marked out of stock. Unlimited stock is untouched.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown order
    /// - `Store`: store failure (flag and stock both unchanged)
    pub async fn set_fulfilled(&self, order_id: Uuid, fulfilled: bool) -> Result<Order, AppError> {
        let mut tx = self.catalog.begin_catalog().await?;

        let current = tx
            .find_order_for_update(order_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let updated = tx.set_order_fulfilled(order_id, fulfilled).await?;

        if !current.fulfilled && fulfilled {
            for (perfume_id, qty) in quantities_by_id(&current.items.0) {
                let Some(record) = tx.lock_perfume(perfume_id).await? else {
                    continue;
                };
                let stock = StockLevel::from_column(record.stock_qty);
                if stock == StockLevel::Unlimited {
                    continue;
                }

                let shipped = u32::try_from(qty).unwrap_or(u32::MAX);
                let remaining = stock.after_shipping(shipped);
                let in_stock = !remaining.is_depleted() && record.in_stock;
                tx.update_stock(perfume_id, remaining, in_stock).await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            from = current.fulfilled,
            to = fulfilled,
            "order fulfillment updated"
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        order::{ContactInfo, DEFAULT_CURRENCY},
        perfume::PerfumeRecord,
    };
    use crate::store::{CatalogTx, MemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    #[test]
    fn phone_digit_bounds() {
        assert!(is_valid_phone("+7 (900) 123-45-67"));
        assert!(is_valid_phone("1234567890"));
        assert!(!is_valid_phone("123456789"));
        assert!(is_valid_phone("123456789012345"));
        assert!(!is_valid_phone("1234567890123456"));
        assert!(!is_valid_phone(""));
    }

    #[test]
    fn drops_unorderable_lines() {
        let lines = vec![
            CartLine {
                id: "p1".to_string(),
                qty: 1,
                ..CartLine::default()
            },
            CartLine {
                id: "  ".to_string(),
                qty: 1,
                ..CartLine::default()
            },
            CartLine {
                id: "p2".to_string(),
                qty: 0,
                ..CartLine::default()
            },
            CartLine {
                id: "p3".to_string(),
                qty: -2,
                ..CartLine::default()
            },
        ];
        let kept = orderable_lines(lines);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "p1");
    }

    #[test]
    fn quantities_group_by_id() {
        let item = |id: &str, qty| OrderItem {
            id: id.to_string(),
            qty,
            volume: 0.0,
            mix: String::new(),
            price: Decimal::ONE,
        };
        let items = vec![item("p1", 2), item("p2", 1), item("p1", 3)];
        let counts = quantities_by_id(&items);
        assert_eq!(counts.get("p1"), Some(&5));
        assert_eq!(counts.get("p2"), Some(&1));
    }

    fn guest() -> Identity {
        Identity {
            user_id: "guest_1".to_string(),
            is_admin: false,
            is_anonymous: true,
        }
    }

    fn perfume(id: &str, price: Option<i64>, base_price: Option<i64>, stock: Option<i32>) -> PerfumeRecord {
        PerfumeRecord {
            id: id.to_string(),
            price: price.map(Decimal::from),
            base_price: base_price.map(Decimal::from),
            currency: String::new(),
            stock_qty: stock,
            in_stock: true,
            order_count: 0,
        }
    }

    fn cart(lines: &[(&str, i32)]) -> CreateOrderRequest {
        CreateOrderRequest {
            items: lines
                .iter()
                .map(|(id, qty)| CartLine {
                    id: id.to_string(),
                    qty: *qty,
                    ..CartLine::default()
                })
                .collect(),
            contact: ContactInfo {
                phone: "89001234567".to_string(),
                ..ContactInfo::default()
            },
            ..CreateOrderRequest::default()
        }
    }

    fn workflow(store: &MemoryStore) -> OrderWorkflow {
        OrderWorkflow::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            DEFAULT_CURRENCY,
        )
    }

    #[tokio::test]
    async fn legacy_price_used_only_without_canonical() {
        let store = MemoryStore::new();
        store.put_perfume(perfume("new", Some(40), Some(99), None)).await;
        store.put_perfume(perfume("old", None, Some(10), None)).await;

        let order = workflow(&store)
            .create_order(&guest(), cart(&[("new", 1), ("old", 2)]))
            .await
            .unwrap();

        assert_eq!(order.total, Decimal::from(60));
        assert_eq!(order.currency, "₽");
    }

    #[tokio::test]
    async fn unpriced_perfume_is_rejected() {
        let store = MemoryStore::new();
        store.put_perfume(perfume("p1", None, None, None)).await;

        let err = workflow(&store)
            .create_order(&guest(), cart(&[("p1", 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(msg) if msg == "perfume has no price: p1"));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn fulfillment_depletes_finite_stock_and_skips_unlimited() {
        let store = MemoryStore::new();
        store.put_perfume(perfume("finite", Some(5), None, Some(2))).await;
        store.put_perfume(perfume("endless", Some(5), None, None)).await;
        let orders = workflow(&store);

        let order = orders
            .create_order(&guest(), cart(&[("finite", 3), ("endless", 4)]))
            .await
            .unwrap();
        orders.set_fulfilled(order.id, true).await.unwrap();
        orders.set_fulfilled(order.id, false).await.unwrap();

        let finite = store.find_perfume("finite").await.unwrap().unwrap();
        assert_eq!(finite.stock_qty, Some(0));
        assert!(!finite.in_stock);

        let endless = store.find_perfume("endless").await.unwrap().unwrap();
        assert_eq!(endless.stock_qty, None);
        assert!(endless.in_stock);
        assert_eq!(endless.order_count, 4);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let store = MemoryStore::new();

        let err = workflow(&store)
            .set_fulfilled(Uuid::new_v4(), true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn oversized_total_is_rejected() {
        let store = MemoryStore::new();
        store.put_perfume(perfume("p1", Some(1000), None, None)).await;

        let err = workflow(&store)
            .create_order(&guest(), cart(&[("p1", 2_000_000_000)]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(msg) if msg == "order total out of range"));
        assert_eq!(store.order_count().await, 0);
    }

    #[derive(Clone, Copy, PartialEq)]
    enum FailAt {
        IncrementOrderCount,
        UpdateStock,
    }

    /// Catalog over a `MemoryStore` whose transactions fail at one step.
    struct FaultyCatalog {
        inner: MemoryStore,
        fail_at: FailAt,
    }

    struct FaultyTx {
        inner: Box<dyn CatalogTx>,
        fail_at: FailAt,
    }

    fn injected() -> StoreError {
        StoreError::Unavailable("injected failure".to_string())
    }

    #[async_trait]
    impl CatalogStore for FaultyCatalog {
        async fn begin_catalog(&self) -> StoreResult<Box<dyn CatalogTx>> {
            Ok(Box::new(FaultyTx {
                inner: self.inner.begin_catalog().await?,
                fail_at: self.fail_at,
            }))
        }

        async fn find_perfume(&self, id: &str) -> StoreResult<Option<PerfumeRecord>> {
            self.inner.find_perfume(id).await
        }

        async fn record_stat_event(
            &self,
            day: NaiveDate,
            perfume_id: &str,
            event_type: &str,
        ) -> StoreResult<()> {
            self.inner.record_stat_event(day, perfume_id, event_type).await
        }
    }

    #[async_trait]
    impl CatalogTx for FaultyTx {
        async fn find_perfumes(&mut self, ids: &[String]) -> StoreResult<Vec<PerfumeRecord>> {
            self.inner.find_perfumes(ids).await
        }

        async fn lock_perfume(&mut self, id: &str) -> StoreResult<Option<PerfumeRecord>> {
            self.inner.lock_perfume(id).await
        }

        async fn increment_order_count(&mut self, perfume_id: &str, by: i64) -> StoreResult<()> {
            if self.fail_at == FailAt::IncrementOrderCount {
                return Err(injected());
            }
            self.inner.increment_order_count(perfume_id, by).await
        }

        async fn update_stock(
            &mut self,
            perfume_id: &str,
            stock: StockLevel,
            in_stock: bool,
        ) -> StoreResult<()> {
            if self.fail_at == FailAt::UpdateStock {
                return Err(injected());
            }
            self.inner.update_stock(perfume_id, stock, in_stock).await
        }

        async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
            self.inner.insert_order(order).await
        }

        async fn find_order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
            self.inner.find_order_for_update(id).await
        }

        async fn set_order_fulfilled(&mut self, id: Uuid, fulfilled: bool) -> StoreResult<Order> {
            self.inner.set_order_fulfilled(id, fulfilled).await
        }

        async fn commit(self: Box<Self>) -> StoreResult<()> {
            self.inner.commit().await
        }
    }

    fn faulty_workflow(store: &MemoryStore, fail_at: FailAt) -> OrderWorkflow {
        OrderWorkflow::new(
            Arc::new(FaultyCatalog {
                inner: store.clone(),
                fail_at,
            }),
            Arc::new(store.clone()),
            DEFAULT_CURRENCY,
        )
    }

    #[tokio::test]
    async fn failed_counter_update_writes_no_order() {
        let store = MemoryStore::new();
        store.put_perfume(perfume("p1", Some(50), None, Some(5))).await;

        let err = faulty_workflow(&store, FailAt::IncrementOrderCount)
            .create_order(&guest(), cart(&[("p1", 2)]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        assert_eq!(store.order_count().await, 0);
        let p1 = store.find_perfume("p1").await.unwrap().unwrap();
        assert_eq!(p1.order_count, 0);
    }

    #[tokio::test]
    async fn failed_stock_update_rolls_back_fulfillment() {
        let store = MemoryStore::new();
        store.put_perfume(perfume("p1", Some(50), None, Some(5))).await;
        let order = workflow(&store)
            .create_order(&guest(), cart(&[("p1", 2)]))
            .await
            .unwrap();

        let err = faulty_workflow(&store, FailAt::UpdateStock)
            .set_fulfilled(order.id, true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        assert!(!store.order(order.id).await.unwrap().fulfilled);
        let p1 = store.find_perfume("p1").await.unwrap().unwrap();
        assert_eq!(p1.stock_qty, Some(5));
        assert!(p1.in_stock);

        workflow(&store).set_fulfilled(order.id, true).await.unwrap();
        let p1 = store.find_perfume("p1").await.unwrap().unwrap();
        assert_eq!(p1.stock_qty, Some(3));
    }
}
