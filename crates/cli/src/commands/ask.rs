use shopdesk_agent::{build_runtime, MessageContext};
use shopdesk_core::config::AppConfig;

use super::{async_runtime, load_config, CommandResult};

pub fn run(message: &str, context: MessageContext) -> CommandResult {
    match load_config("ask") {
        Ok(config) => {
            crate::init_logging(&config);
            run_with_config(&config, message, context)
        }
        Err(failure) => failure,
    }
}

pub fn run_with_config(
    config: &AppConfig,
    message: &str,
    context: MessageContext,
) -> CommandResult {
    if message.trim().is_empty() {
        return CommandResult::failure("ask", "invalid_input", "message must not be empty", 2);
    }

    let assistant = match build_runtime(config) {
        Ok(assistant) => assistant,
        Err(error) => return CommandResult::failure("ask", "bootstrap", error.to_string(), 3),
    };
    let executor = match async_runtime("ask") {
        Ok(executor) => executor,
        Err(failure) => return failure,
    };

    let reply = executor.block_on(assistant.process_message(message, &context));
    match serde_json::to_value(&reply) {
        Ok(data) => CommandResult::success_with_data("ask", reply.response.clone(), Some(data)),
        Err(error) => CommandResult::failure(
            "ask",
            "serialization",
            format!("reply could not be serialized: {error}"),
            1,
        ),
    }
}
