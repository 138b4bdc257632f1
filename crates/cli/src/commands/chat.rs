//! `salesdesk chat` — interactive mode. One session per chat.

use super::ask::print_response;
use super::runtime::{Runtime, cancel_on_ctrl_c, load_config};
use salesdesk_agent::{CancellationToken, PipelineRequest};
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

pub async fn run(user: String, trace: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::build(load_config()?).await?;
    let session_id = uuid::Uuid::new_v4().to_string();

    println!();
    println!("  salesdesk — interactive mode");
    println!();
    println!("  Model:     {}", runtime.config.llm.model);
    println!("  Endpoint:  {}", runtime.config.llm.api_url);
    println!("  Store:     {}", runtime.store.name());
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'quit' or 'exit', or press Ctrl+C, to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let interrupt = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let Some(line) = next_input(&mut lines, interrupt).await? else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit(input) {
            break;
        }

        let request = PipelineRequest::new(input)
            .with_user(user.clone())
            .with_session(session_id.clone());
        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(cancel.clone());
        let response = runtime.pipeline.run(request, cancel).await;
        watcher.abort();

        println!();
        print_response(&response, trace);
        println!();
    }

    runtime.metrics.log_metrics();
    println!();
    println!("  Goodbye!");
    Ok(())
}

/// The next input line, or `None` on end of input or when `interrupt`
/// fires first.
async fn next_input<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input.to_ascii_lowercase().as_str(), "quit" | "exit")
}
