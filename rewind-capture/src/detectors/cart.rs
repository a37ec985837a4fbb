use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Signal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

impl CartItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64, quantity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            quantity: quantity.max(1),
        }
    }
}

/// Running cart model for the abandonment signal.
#[derive(Debug, Clone, Default)]
pub struct CartTracker {
    items: Vec<CartItem>,
    checkout_started: bool,
    purchased: bool,
    abandonment_reported: bool,
}

impl CartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn total(&self) -> f64 {
        self.items
            .iter()
            .map(|i| i.price * i.quantity as f64)
            .sum()
    }

    pub fn add(&mut self, item: CartItem) -> Signal {
        let props = json!({
            "id": item.id,
            "name": item.name,
            "price": item.price,
            "quantity": item.quantity,
        });
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => self.items.push(item),
        }
        Signal::new("add_to_cart", props)
    }

    /// Remove `quantity` units of an item, or all of it when `None`.
    pub fn remove(&mut self, id: &str, quantity: Option<u32>) -> Signal {
        let mut removed = 0;
        if let Some(pos) = self.items.iter().position(|i| i.id == id) {
            let item = &mut self.items[pos];
            let take = quantity.unwrap_or(item.quantity).min(item.quantity);
            item.quantity -= take;
            removed = take;
            if item.quantity == 0 {
                self.items.remove(pos);
            }
        }
        Signal::new("remove_from_cart", json!({ "id": id, "quantity": removed }))
    }

    pub fn checkout_start(&mut self) -> Signal {
        self.checkout_started = true;
        Signal::new(
            "checkout_start",
            json!({ "items": self.items, "total": self.total() }),
        )
    }

    /// Record a completed order. `total` defaults to the cart total.
    pub fn purchase(&mut self, order_id: Option<&str>, total: Option<f64>) -> Signal {
        let total = total.unwrap_or_else(|| self.total());
        let signal = Signal::new(
            "purchase",
            json!({ "order_id": order_id, "total": total, "items": self.items }),
        );
        self.purchased = true;
        self.items.clear();
        signal
    }

    /// Abandonment report for a non-empty, unpurchased cart. At most once.
    pub fn finalize(&mut self) -> Option<Signal> {
        if self.abandonment_reported || self.purchased || self.items.is_empty() {
            return None;
        }
        self.abandonment_reported = true;
        Some(Signal::new(
            "cart_abandonment",
            json!({
                "items": self.items,
                "total": self.total(),
                "checkout_started": self.checkout_started,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_and_remove_decrements() {
        let mut c = CartTracker::new();
        c.add(CartItem::new("sku-1", "Mug", 10.0, 1));
        c.add(CartItem::new("sku-1", "Mug", 10.0, 2));
        c.add(CartItem::new("sku-2", "Tee", 25.0, 1));
        assert_eq!(c.items()[0].quantity, 3);
        assert_eq!(c.total(), 55.0);

        let s = c.remove("sku-1", Some(1));
        assert_eq!(s.props["quantity"], 1);
        c.remove("sku-2", None);
        assert_eq!(c.items().len(), 1);
        assert_eq!(c.total(), 20.0);
    }

    #[test]
    fn test_quantity_saturates() {
        let mut c = CartTracker::new();
        c.add(CartItem::new("sku-1", "Mug", 1.0, u32::MAX));
        c.add(CartItem::new("sku-1", "Mug", 1.0, 5));
        assert_eq!(c.items()[0].quantity, u32::MAX);
    }

    #[test]
    fn test_abandonment_once_and_only_without_purchase() {
        let mut c = CartTracker::new();
        assert!(c.finalize().is_none());
        c.add(CartItem::new("a", "A", 5.0, 1));
        let s = c.finalize().unwrap();
        assert_eq!(s.name, "cart_abandonment");
        assert_eq!(s.props["total"], 5.0);
        assert!(c.finalize().is_none());
    }

    #[test]
    fn test_purchase_suppresses_abandonment() {
        let mut c = CartTracker::new();
        c.add(CartItem::new("a", "A", 5.0, 2));
        c.checkout_start();
        let p = c.purchase(Some("o-1"), None);
        assert_eq!(p.props["total"], 10.0);
        c.add(CartItem::new("b", "B", 1.0, 1));
        assert!(c.finalize().is_none());
    }
}
