//! `salesdesk config` — Configuration commands.

use salesdesk_config::AppConfig;

pub fn default() {
    print!("{}", AppConfig::default_toml());
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("***".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");
            if !config.has_api_key() {
                println!("   ⚠️  No API key set (SALESDESK_API_KEY, API_KEY or OPENAI_API_KEY)");
            }
            println!();
            println!("   Model:     {}", config.llm.model);
            println!("   Endpoint:  {}", config.llm.api_url);
            println!("   Store:     {:?}", config.store.backend);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}
