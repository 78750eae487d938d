//! Wiring: build a ready-to-use run controller from an [`AppConfig`].

use std::sync::Arc;
use waypoint_checkpoint::{FileCheckpointStore, InMemoryCheckpointStore};
use waypoint_config::AppConfig;
use waypoint_core::{CheckpointStore, Error, EventBus, Provider, ToolRegistry};
use waypoint_telemetry::TelemetryEngine;

use crate::controller::RunController;
use crate::reasoner::LlmReasoner;

/// Everything a front end (CLI, gateway) needs to serve conversations.
#[derive(Clone)]
pub struct Runtime {
    pub controller: Arc<RunController>,
    pub tools: Arc<ToolRegistry>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub event_bus: Arc<EventBus>,
    pub telemetry: Option<Arc<TelemetryEngine>>,
}

/// Build the runtime with the configured default provider.
pub async fn build_from_config(config: &AppConfig) -> Result<Runtime, Error> {
    let router = waypoint_providers::build_from_config(config);
    let provider = router.default().ok_or_else(|| Error::Config {
        message: format!("provider '{}' is not available", router.default_name()),
    })?;
    let model = router
        .model_for(router.default_name())
        .unwrap_or(&config.default_model)
        .to_string();
    build_with_provider(config, provider, model).await
}

/// Build the runtime around an explicit provider.
pub async fn build_with_provider(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    model: impl Into<String>,
) -> Result<Runtime, Error> {
    let tools = Arc::new(waypoint_tools::default_registry());
    let checkpoints = open_checkpoint_store(config).await?;

    let mut reasoner = LlmReasoner::new(provider, model, tools.clone())
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens);
    if let Some(prompt) = &config.reasoner.system_prompt {
        reasoner = reasoner.with_system_prompt(prompt.clone());
    }

    let event_bus = Arc::new(EventBus::default());
    let telemetry = config
        .telemetry
        .enabled
        .then(|| Arc::new(TelemetryEngine::with_capacity(config.telemetry.max_traces)));

    let mut controller = RunController::new(Arc::new(reasoner), tools.clone(), checkpoints.clone())
        .with_budgets(config.budgets.to_budgets())
        .with_reset_iterations(config.budgets.reset_iterations_each_turn)
        .with_hitl(config.hitl.clone())
        .with_silent_tools(config.silent_tools.iter().cloned())
        .with_event_bus(event_bus.clone());
    if let Some(telemetry) = &telemetry {
        controller = controller.with_telemetry(telemetry.clone());
    }

    tracing::info!(
        model = %config.default_model,
        tools = tools.len(),
        checkpoint_backend = %config.checkpoint.backend,
        "Runtime ready"
    );

    Ok(Runtime {
        controller: Arc::new(controller),
        tools,
        checkpoints,
        event_bus,
        telemetry,
    })
}

/// Open the checkpoint backend named in the config.
pub async fn open_checkpoint_store(config: &AppConfig) -> Result<Arc<dyn CheckpointStore>, Error> {
    let backend = config.checkpoint.backend.as_str();
    let store: Arc<dyn CheckpointStore> = match backend {
        "memory" => Arc::new(InMemoryCheckpointStore::new()),
        "file" => Arc::new(FileCheckpointStore::new(config.checkpoint.resolved_path())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.checkpoint.resolved_path();
            Arc::new(waypoint_checkpoint::SqliteCheckpointStore::new(&path).await?)
        }
        other => {
            return Err(Error::Config {
                message: format!("unknown checkpoint backend '{other}'"),
            });
        }
    };
    tracing::debug!(backend, store = store.name(), "Checkpoint store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, make_text_response};
    use waypoint_core::ConversationId;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.checkpoint.backend = "memory".into();
        config
    }

    #[tokio::test]
    async fn runtime_serves_a_turn() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "Hello! Where would you like to go?",
        )]));
        let runtime = build_with_provider(&memory_config(), provider, "mock-model")
            .await
            .unwrap();
        assert_eq!(runtime.tools.len(), 10);

        let mut events = runtime.event_bus.subscribe();
        let outcome = runtime
            .controller
            .run_turn(&ConversationId::from("rt"), "hi")
            .await
            .unwrap();
        assert!(outcome.reply().unwrap().expects_reply);
        assert!(events.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unknown_backend_is_a_config_error() {
        let mut config = AppConfig::default();
        config.checkpoint.backend = "etcd".into();
        let err = open_checkpoint_store(&config).await.err().unwrap();
        assert!(err.to_string().contains("unknown checkpoint backend"));
    }

    #[tokio::test]
    async fn file_backend_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.checkpoint.backend = "file".into();
        config.checkpoint.path = Some(dir.path().to_path_buf());
        let store = open_checkpoint_store(&config).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
