//! Wires an [`AgentRuntime`] from loaded configuration.

use std::sync::Arc;

use shopdesk_core::config::AppConfig;
use shopdesk_core::domain::knowledge::KnowledgeBase;
use shopdesk_core::domain::profile::AssistantProfile;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendError, HttpCommerceBackend};
use crate::llm::{DisabledLlmClient, GenerationError, GenerationOptions, HttpLlmClient, LlmClient};
use crate::runtime::AgentRuntime;
use crate::tools::FunctionRegistry;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to initialize commerce backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to initialize text generation client: {0}")]
    Generation(#[from] GenerationError),
}

/// Missing knowledge base or profile files degrade to defaults; only HTTP
/// client construction can fail.
pub fn build_runtime(config: &AppConfig) -> Result<AgentRuntime, BootstrapError> {
    let knowledge = KnowledgeBase::load_or_empty(&config.assistant.knowledge_base_path);
    let duplicates = knowledge.duplicate_ids();
    if !duplicates.is_empty() {
        warn!(
            event_name = "assistant.knowledge_base.duplicate_ids",
            duplicates = ?duplicates,
            "knowledge base contains duplicate policy ids"
        );
    }
    let profile = AssistantProfile::load_or_default(&config.assistant.profile_path);

    let backend = HttpCommerceBackend::new(&config.backend)?;
    let registry = FunctionRegistry::with_commerce_backend(Arc::new(backend));

    let llm: Arc<dyn LlmClient> = if config.generation.is_enabled() {
        Arc::new(HttpLlmClient::new(&config.generation)?)
    } else {
        warn!(
            event_name = "assistant.generation.disabled",
            "no generation endpoint configured, canned fallbacks will be used"
        );
        Arc::new(DisabledLlmClient)
    };

    info!(
        event_name = "assistant.runtime.ready",
        knowledge_base_entries = knowledge.len(),
        assistant = %profile.identity.name,
        generation_enabled = config.generation.is_enabled(),
        backend = %config.backend.base_url,
        "assistant runtime initialized"
    );

    Ok(AgentRuntime::new(knowledge, profile, registry, llm)
        .with_generation_options(GenerationOptions::from_config(&config.generation)))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use shopdesk_core::config::AppConfig;
    use shopdesk_core::domain::intent::IntentKind;
    use tempfile::TempDir;

    use super::build_runtime;
    use crate::runtime::MessageContext;

    #[tokio::test]
    async fn missing_files_still_produce_a_working_runtime() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = AppConfig::default();
        config.assistant.knowledge_base_path = dir.path().join("absent.json");
        config.assistant.profile_path = dir.path().join("absent.toml");

        let runtime = build_runtime(&config).expect("runtime");
        assert!(runtime.knowledge_base().is_empty());
        assert_eq!(runtime.profile().identity.name, "Lin");

        let reply = runtime.process_message("hey there", &MessageContext::default()).await;
        assert_eq!(reply.intent, IntentKind::Chitchat);
    }

    #[tokio::test]
    async fn loads_knowledge_base_and_profile_from_disk() {
        let dir = TempDir::new().expect("tempdir");
        let kb_path = dir.path().join("ground-truth.json");
        let profile_path = dir.path().join("assistant.toml");
        fs::write(
            &kb_path,
            r#"[{"id": "Policy2.1", "category": "shipping", "question": "How long does shipping take?",
                 "answer": "Standard shipping takes 3-5 business days."}]"#,
        )
        .expect("write kb");
        fs::write(&profile_path, "[identity]\nname = \"Maya\"\n").expect("write profile");

        let mut config = AppConfig::default();
        config.assistant.knowledge_base_path = kb_path;
        config.assistant.profile_path = profile_path;

        let runtime = build_runtime(&config).expect("runtime");
        assert_eq!(runtime.knowledge_base().ids(), vec!["Policy2.1"]);
        assert_eq!(runtime.profile().identity.name, "Maya");

        let reply = runtime
            .process_message("How long does shipping take?", &MessageContext::default())
            .await;
        assert_eq!(reply.intent, IntentKind::PolicyQuestion);
        assert_eq!(reply.response, "Standard shipping takes 3-5 business days. [Policy2.1]");
        assert!(reply.metadata.used_generation, "policy questions take the generation path");
    }
}
