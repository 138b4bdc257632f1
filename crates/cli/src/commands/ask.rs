//! `salesdesk ask` — one request, one answer.

use super::runtime::{Runtime, cancel_on_ctrl_c, load_config};
use salesdesk_agent::{CancellationToken, PipelineRequest, PipelineResponse, StageKind};

pub async fn run(
    message: String,
    context: Option<String>,
    session: Option<String>,
    user: String,
    trace: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = PipelineRequest::new(message).with_user(user);
    if let Some(raw) = context {
        request = request.with_context(parse_context(&raw)?);
    }
    if let Some(session) = session {
        request = request.with_session(session);
    }

    let runtime = Runtime::build(load_config()?).await?;

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());
    eprint!("  Thinking...");
    let response = runtime.pipeline.run(request, cancel).await;
    eprint!("\r              \r");
    watcher.abort();

    print_response(&response, trace);
    Ok(())
}

/// `--context` must be a JSON object.
pub fn parse_context(raw: &str) -> Result<serde_json::Value, String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(_) => Err("--context must be a JSON object".into()),
        Err(e) => Err(format!("--context is not valid JSON: {e}")),
    }
}

pub fn print_response(response: &PipelineResponse, trace: bool) {
    if trace {
        for outcome in &response.stage_outputs {
            eprintln!(
                "  [{} · {} · {} model call(s), {} tool call(s)]",
                outcome.stage,
                outcome.status.as_str(),
                outcome.model_calls,
                outcome.tool_calls
            );
            for line in outcome.output.lines() {
                eprintln!("    {line}");
            }
        }
        eprintln!(
            "  [session {} · {} · {} tokens]",
            response.session_id,
            response.status.as_str(),
            response.token_usage.total_tokens
        );
        eprintln!();
    }

    println!("{}", response.customer_response);

    let order_id = response
        .stage(StageKind::Order)
        .and_then(|o| o.tool_result.as_ref())
        .filter(|r| r.ok)
        .and_then(|r| r.payload.as_ref())
        .and_then(|p| p.get("order_id"))
        .and_then(|id| id.as_str());
    if let Some(order_id) = order_id {
        println!();
        println!("  Order: {order_id}");
    }
}
