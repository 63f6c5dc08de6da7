use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use shopdesk_agent::stats::StatsSnapshot;
use shopdesk_agent::{build_runtime, AgentRuntime, MessageContext};

use super::{async_runtime, load_config, CommandResult};

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

pub fn run(context: MessageContext) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    crate::init_logging(&config);

    let assistant = match build_runtime(&config) {
        Ok(assistant) => assistant,
        Err(error) => return CommandResult::failure("chat", "bootstrap", error.to_string(), 3),
    };
    let executor = match async_runtime("chat") {
        Ok(executor) => executor,
        Err(failure) => return failure,
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let session = executor.block_on(run_session(&assistant, &context, stdin.lock(), stdout.lock()));
    match session.and_then(|stats| Ok((serde_json::to_value(&stats)?, stats.stats.total_queries))) {
        Ok((data, total)) => CommandResult::success_with_data(
            "chat",
            format!("session ended after {total} messages"),
            Some(data),
        ),
        Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), 1),
    }
}

/// Reads one message per line until EOF or an exit word.
pub async fn run_session<R, W>(
    assistant: &AgentRuntime,
    context: &MessageContext,
    input: R,
    mut output: W,
) -> Result<StatsSnapshot>
where
    R: BufRead,
    W: Write,
{
    let name = assistant.profile().identity.name.clone();
    writeln!(output, "{name} is ready. Type `exit` to leave.").context("failed to write greeting")?;

    for line in input.lines() {
        let line = line.context("failed to read input")?;
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&message.to_ascii_lowercase().as_str()) {
            break;
        }

        let reply = assistant.process_message(message, context).await;
        let citations = if reply.citations.valid_citations.is_empty() {
            "none".to_string()
        } else {
            reply.citations.valid_citations.join(", ")
        };
        writeln!(output, "{name}: {}", reply.response).context("failed to write reply")?;
        writeln!(output, "  [intent: {} | citations: {citations}]", reply.intent)
            .context("failed to write reply details")?;
    }

    Ok(assistant.stats_snapshot().await)
}
