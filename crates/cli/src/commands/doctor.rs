//! `salesdesk doctor` — Diagnose system health.

use salesdesk_config::AppConfig;
use salesdesk_core::store::ProductQuery;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("salesdesk doctor — system diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ⚠️  No config file, using defaults (`salesdesk config > {}`)", config_path.display());
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            return Ok(());
        }
    };

    println!("     Model:    {}", config.llm.model);
    println!("     Endpoint: {}", config.llm.api_url);
    println!("     Store:    {:?}", config.store.backend);
    println!("     Attempts: {}", config.pipeline.max_attempts);
    println!("     Language: {}", config.pipeline.reply_language);

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured (fine for a local server)");
    }

    // Store
    match salesdesk_store::open_from_config(&config.store).await {
        Ok(store) => match store.health_check().await {
            Ok(true) => {
                let lookup = store.get_product(&ProductQuery::new("iPhone")).await;
                let products = lookup.map(|l| l.products.len()).unwrap_or(0);
                println!("  ✅ Store '{}' reachable ({products} iPhone product(s))", store.name());
            }
            Ok(false) | Err(_) => {
                println!("  ❌ Store '{}' health check failed", store.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Store unavailable: {e}");
            issues += 1;
        }
    }

    // Provider
    match salesdesk_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!("  ❌ Provider '{}' reported unhealthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{}' unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Provider not configured: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
