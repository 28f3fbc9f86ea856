//! `roomcast chat`: the agent in a one-person terminal room.

use roomcast_agent::ChatAgent;
use roomcast_channels::CliTransport;
use roomcast_config::AppConfig;
use std::sync::Arc;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with setup help
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
        eprintln!("    OPENAI_API_KEY=sk-...             (with ROOMCAST_BASE_URL=https://api.openai.com/v1)");
        eprintln!("    ROOMCAST_API_KEY=...              (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let search_status = if config.search.api_key.is_some() {
        "enabled"
    } else {
        "disabled (set TAVILY_API_KEY)"
    };

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        Roomcast Agent: Terminal Room        ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Endpoint:  {}", config.llm.base_url);
    println!("  Model:     {}", config.llm.model);
    println!("  Search:    {search_status}");
    println!("  Agent:     {}", config.agent.name);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let transport = Arc::new(CliTransport::new());
    let agent = ChatAgent::new(config, transport.clone());
    agent.initialize().await?;

    transport.prompt();
    tokio::select! {
        _ = transport.wait_for_exit() => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    agent.dispose().await;

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
