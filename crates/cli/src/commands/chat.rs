//! `toolbridge chat`: Interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use toolbridge_agent::{OrchestrationLoop, Session};
use toolbridge_config::AppConfig;
use toolbridge_core::event::EventBus;
use toolbridge_tools::ManifestLoader;

use super::{CommandResult, load_config};

const CLI_SESSION_ID: &str = "cli";

pub async fn run(explicit: Option<&Path>, message: Option<String>) -> CommandResult {
    let config = load_config(explicit)?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!("    TOOLBRIDGE_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add reasoning.api_key to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let event_bus = Arc::new(EventBus::default());
    let _events = toolbridge_gateway::spawn_event_logger(&event_bus);
    let orchestrator = toolbridge_gateway::build_orchestrator(&config, event_bus)?;
    let manifests = ManifestLoader::from_config(&config.tools)?;
    let session = Session::new(CLI_SESSION_ID);

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let answer = ask(&orchestrator, &manifests, &session, &msg).await;
        eprint!("\r              \r");
        println!("{}", answer?);
        return Ok(());
    }

    toolbridge_gateway::warm_up(&config, &manifests).await;
    let tool_count = manifests.cached().await.map(|m| m.len());

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        toolbridge: Interactive Mode         ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:       {}", config.reasoning.model);
    println!("  Tool layer:  {}", config.tools.base_url);
    match tool_count {
        Some(n) => println!("  Tools:       {n} discovered"),
        None => println!("  Tools:       not loaded yet"),
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/reset' clears the conversation, 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "exit" | "quit" => break,
            "/reset" => match session.reset() {
                Ok(()) => println!("  Conversation cleared.\n"),
                Err(e) => eprintln!("  [Error] {e}\n"),
            },
            _ => {
                eprint!("  ...");
                let answer = ask(&orchestrator, &manifests, &session, input).await;
                eprint!("\r     \r");
                match answer {
                    Ok(response) => {
                        println!();
                        for line in response.lines() {
                            println!("  Assistant > {line}");
                        }
                        println!();
                    }
                    Err(e) => {
                        eprintln!("  [Error] {e}");
                        println!();
                    }
                }
            }
        }
        prompt()?;
    }

    session.close();
    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}

async fn ask(
    orchestrator: &OrchestrationLoop,
    manifests: &ManifestLoader,
    session: &Session,
    utterance: &str,
) -> toolbridge_core::Result<String> {
    let manifest = manifests.load().await?;
    let outcome = orchestrator.run_round(session, &manifest, utterance).await?;
    Ok(outcome.answer)
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
