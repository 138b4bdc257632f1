//! The demo catalog loaded by `salesdesk seed` and `store.seed_on_start`.

use salesdesk_core::store::ProductRecord;

fn product(id: &str, name: &str, storage: &str, color: &str, price: f64, quantity: u32) -> ProductRecord {
    ProductRecord {
        product_id: id.into(),
        product: name.into(),
        storage: storage.into(),
        color: color.into(),
        price,
        quantity,
    }
}

/// Six demo products, prices in VND.
pub fn seed_catalog() -> Vec<ProductRecord> {
    vec![
        product("1", "iPhone 15 Pro Max", "256GB", "Titan tự nhiên", 27_990_000.0, 3),
        product("2", "iPhone 15 Pro", "1TB", "Gold Rose", 26_990_000.0, 1),
        product("3", "iPhone 12 Pro", "512GB", "Graphite", 24_990_000.0, 5),
        product("4", "Samsung Galaxy S23 Ultra", "512GB", "Phantom Black", 32_990_000.0, 2),
        product("5", "MacBook Pro 16 inch M1 Pro", "512GB", "Silver", 49_990_000.0, 1),
        product("6", "Dell XPS 13", "256GB", "Black", 24_990_000.0, 4),
    ]
}
