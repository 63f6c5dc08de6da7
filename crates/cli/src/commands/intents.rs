use serde_json::json;
use shopdesk_core::domain::intent::IntentKind;

use super::CommandResult;

pub fn run() -> CommandResult {
    let intents = IntentKind::ALL
        .into_iter()
        .map(|intent| {
            json!({
                "label": intent.as_str(),
                "generation": intent.requires_generation(),
                "functions": intent.uses_functions(),
            })
        })
        .collect::<Vec<_>>();
    let labels = IntentKind::ALL.map(|intent| intent.as_str()).join(", ");

    CommandResult::success_with_data("intents", labels, Some(json!(intents)))
}
