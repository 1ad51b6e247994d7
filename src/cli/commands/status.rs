use anyhow::Result;
use std::collections::BTreeMap;

use crate::cli::output::{
    CollectionStatus, GenerationStatus, StatusInfo, StoreStatus, get_formatter,
};
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::services::{OllamaGenerator, VectorStore, open_stores};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    let generator = OllamaGenerator::new(&config.generation)?;
    let (reachable, model_available) = match generator.health_check().await {
        Ok(available) => (true, available),
        Err(_) => (false, false),
    };

    // Collections grouped by the server that holds them
    let mut by_url: BTreeMap<String, Vec<String>> = BTreeMap::new();
    by_url
        .entry(config.vector_store.url.clone())
        .or_default()
        .push(config.vector_store.collection.clone());
    for target in config.retrieval.resolved_targets(&config.vector_store) {
        let collections = by_url.entry(target.url).or_default();
        if !collections.contains(&target.collection) {
            collections.push(target.collection);
        }
    }

    let stores = open_stores(&config.vector_store, by_url.keys().map(String::as_str))?;
    let mut store_statuses = Vec::new();
    for (url, collections) in &by_url {
        let Some(store) = stores.get(url) else {
            continue;
        };
        store_statuses.push(store_status(store.as_ref(), url, collections).await);
    }

    let status = StatusInfo {
        embedding_provider: config.embedding.provider.to_string(),
        embedding_model: config.embedding.model.clone(),
        embedding_dimension: config.embedding.dimension,
        generation: GenerationStatus {
            url: config.generation.url.clone(),
            model: config.generation.model.clone(),
            reachable,
            model_available,
        },
        stores: store_statuses,
    };

    print!("{}", formatter.format_status(&status));

    let disconnected = status.stores.iter().any(|s| !s.connected);
    if disconnected || !reachable || !model_available {
        eprintln!();
        if disconnected && config.vector_store.driver == VectorDriver::Qdrant {
            eprintln!("Warning: Qdrant not reachable. Start with: docker compose up -d qdrant");
        }
        if !reachable {
            eprintln!(
                "Warning: Ollama not reachable at {}. Start with: ollama serve",
                config.generation.url
            );
        } else if !model_available {
            eprintln!(
                "Hint: model '{}' not pulled. Run: ollama pull {}",
                config.generation.model, config.generation.model
            );
        }
    }

    Ok(())
}

async fn store_status(store: &dyn VectorStore, url: &str, collections: &[String]) -> StoreStatus {
    let connected = store.health_check().await.is_ok();
    let mut statuses = Vec::new();

    if connected {
        for name in collections {
            let info = store.collection_info(name).await.ok().flatten();
            statuses.push(CollectionStatus {
                name: name.clone(),
                exists: info.is_some(),
                points: info.map_or(0, |i| i.points_count),
            });
        }
    }

    StoreStatus {
        driver: store.driver().to_string(),
        url: url.to_string(),
        connected,
        collections: statuses,
    }
}
