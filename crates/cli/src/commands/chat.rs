//! `parley chat`: Interactive or single-message chat mode.
//!
//! Replies are printed fragment by fragment as they arrive. The
//! conversation is loaded from and saved to the configured storage path,
//! so it is shared with `parley serve`.

use std::io::Write;

use parley_agent::{Agent, Fragment, render_error};
use parley_config::AppConfig;
use parley_core::exchange::ContextMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub async fn run(config: &AppConfig, message: Option<String>) -> anyhow::Result<()> {
    if config.api_key.is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    PARLEY_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    let agent = parley_gateway::build_agent(config);
    let state_file = config.storage.state_file();
    agent.load_state(&state_file);

    if let Some(msg) = message {
        let ok = print_reply(&agent, &msg, &mut std::io::stdout()).await?;
        save(&agent, config);
        if !ok {
            anyhow::bail!("Chat failed");
        }
        return Ok(());
    }

    println!();
    println!("  parley: interactive chat");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", agent.list_tools().join(", "));
    println!("  History:   {} exchange(s)", agent.store().len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        // Once a signal listener exists, Ctrl-C no longer kills the process
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        print!("  Assistant > ");
        print_reply(&agent, input, &mut std::io::stdout()).await?;
        println!();
        save(&agent, config);
    }

    save(&agent, config);
    println!("  Goodbye!");
    Ok(())
}

/// Stream one reply into `out`. Returns `false` if the reply failed or
/// was interrupted with Ctrl-C.
pub async fn print_reply(agent: &Agent, input: &str, out: &mut impl Write) -> anyhow::Result<bool> {
    let cancel = CancellationToken::new();
    let mut fragments = agent.process_stream_with_cancel(input, ContextMap::new(), cancel.clone());
    let mut ok = true;

    loop {
        tokio::select! {
            fragment = fragments.recv() => match fragment {
                Some(Fragment::Text(text)) => {
                    write!(out, "{text}")?;
                    out.flush()?;
                }
                Some(Fragment::Error(e)) => {
                    writeln!(out)?;
                    eprintln!("  [Error] {}", render_error(&e));
                    ok = false;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            }
        }
    }

    writeln!(out)?;
    Ok(ok)
}

fn save(agent: &Agent, config: &AppConfig) {
    if let Err(e) = agent.save_state(&config.storage.state_file()) {
        warn!(error = %e, "Failed to save conversation state");
    }
}
