use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ctx_broker::{BrokerClient, Clock, InMemoryBroker, SystemClock};
use ctx_core::config::{
    node_id_from_env_value, poll_interval_from_env_value, property_file_from_env_value,
    remote_events_from_env_value, search_limits_from_env_value, subjects_from_env_value,
};
use ctx_core::{
    ContextManager, EventBus, InMemoryPropertyStore, JsonFilePropertyStore, NodeConfig,
    PropertyStore, RemoteContextBridge, RemoteEventDispatcher, SelectionMemory,
};
use ctx_types::{CONTEXT_CHANGED_EVENT, EventName};

/// Main entry point for a context node
///
/// Wires the context manager, local event bus and remote event dispatcher together, restores
/// remembered selections, then runs the dispatcher until Ctrl-C.
///
/// # Environment Variables
/// - `CTX_NODE_ID`: identity of this node (default: a random id)
/// - `CTX_POLL_INTERVAL_MS`: broker poll interval (default: 2000)
/// - `CTX_SUBJECTS`: comma-separated context subjects (default: "Patient,Location,User")
/// - `CTX_REMOTE_EVENTS`: comma-separated event names to receive remotely
///   (default: "CONTEXT.CHANGED")
/// - `CTX_MAX_SEARCH_RESULTS`: cap on resource search results (default: 100)
/// - `CTX_PROPERTY_FILE`: JSON file for remembered selections (default: in memory only)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("ctx=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = node_config_from_env()?;
    tracing::info!(
        "++ Starting context node {} (subjects: {:?}, max search results: {})",
        config.node_id(),
        config.subjects().iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        config.search_limits().max_results()
    );

    let properties: Arc<dyn PropertyStore> = match config.property_file() {
        Some(path) => {
            tracing::info!("++ Remembering selections in {}", path.display());
            Arc::new(JsonFilePropertyStore::open(path)?)
        }
        None => Arc::new(InMemoryPropertyStore::new()),
    };
    let memory = Arc::new(SelectionMemory::new(properties));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broker: Arc<dyn BrokerClient> = Arc::new(InMemoryBroker::with_clock(clock.clone()));
    let bus = Arc::new(EventBus::new());

    let manager = Arc::new(ContextManager::new(config.subjects().iter().cloned()));
    manager.register_subscriber(memory.clone(), i32::MAX, config.subjects());
    manager.add_propagator(bus.clone());

    let dispatcher = Arc::new(RemoteEventDispatcher::new(
        config.dispatcher_config(),
        broker,
        bus.clone(),
        clock,
    ));
    manager.add_propagator(dispatcher.clone());
    bus.subscribe(
        EventName::new(CONTEXT_CHANGED_EVENT)?,
        Arc::new(RemoteContextBridge::new(&manager)),
    );

    for event in config.remote_events() {
        dispatcher.subscribe_remote_event(event, true).await?;
    }

    for subject in config.subjects() {
        match memory.recall(subject) {
            Ok(Some(value)) => match manager.request_change(subject, Some(value)) {
                Ok(()) => tracing::info!("restored remembered {} selection", subject),
                Err(e) => tracing::warn!("could not restore {} selection: {}", subject, e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("ignoring remembered {} selection: {}", subject, e),
        }
    }

    dispatcher.start()?;
    tracing::info!("++ Context node {} ready", config.node_id());

    tokio::signal::ctrl_c().await?;
    tracing::info!("-- Shutting down context node {}", config.node_id());
    dispatcher.terminate();
    dispatcher.join().await;

    Ok(())
}

fn node_config_from_env() -> anyhow::Result<NodeConfig> {
    let var = |key: &str| std::env::var(key).ok();
    Ok(NodeConfig::new(
        node_id_from_env_value(var("CTX_NODE_ID"))?,
        poll_interval_from_env_value(var("CTX_POLL_INTERVAL_MS"))?,
        subjects_from_env_value(var("CTX_SUBJECTS"))?,
        remote_events_from_env_value(var("CTX_REMOTE_EVENTS"))?,
        search_limits_from_env_value(var("CTX_MAX_SEARCH_RESULTS"))?,
        property_file_from_env_value(var("CTX_PROPERTY_FILE")),
    )?)
}
