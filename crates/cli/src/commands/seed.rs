//! `salesdesk seed` — load the demo catalog.

use super::runtime::load_config;
use salesdesk_core::Result;
use salesdesk_store::{open_from_config, seed_catalog};

pub async fn run() -> Result<()> {
    let config = load_config()?;
    let mut store_config = config.store.clone();
    store_config.seed_on_start = false;

    let store = open_from_config(&store_config).await?;
    let count = store.upsert_products(&seed_catalog()).await?;

    println!("  Seeded {count} products into the {} store", store.name());
    if store.name() == "memory" {
        println!("  Note: the memory store is not persisted; set [store] backend = \"sqlite\" to keep data.");
    }
    Ok(())
}
