//! The hosting binary: load config + map + scenario, assemble the cluster,
//! inject identities and mobiles, drive the clock, serve the WebSocket
//! visualization feed.
//!
//! ```text
//! uta-node [config.json] [map.json] [scenario.json]
//! ```
//!
//! Missing files fall back to defaults (default config, empty map, no
//! mobiles), which makes a bare `uta-node` useful as a smoke test.

mod scenario;
mod ws;

use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};
use uta_core::{EntityId, NodeConfig};
use uta_entities::map::CityMap;
use uta_entities::proto::Command;
use uta_runtime::{Cluster, Services};

use crate::scenario::ScenarioDoc;

fn injector() -> EntityId {
    EntityId::new("injector").expect("constant ID is non-empty")
}

fn read_if_present(path: &str) -> anyhow::Result<Option<String>> {
    if !Path::new(path).exists() {
        return Ok(None);
    }
    Ok(Some(
        std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.json".to_owned());
    let map_path = args.next().unwrap_or_else(|| "map.json".to_owned());
    let scenario_path = args.next().unwrap_or_else(|| "scenario.json".to_owned());

    let config: NodeConfig = match read_if_present(&config_path)? {
        Some(json) => serde_json::from_str(&json).with_context(|| format!("parsing {config_path}"))?,
        None => {
            warn!(path = %config_path, "no config file; using defaults");
            NodeConfig::default()
        }
    };

    let map = match read_if_present(&map_path)? {
        Some(json) => CityMap::from_json(&json).with_context(|| format!("parsing {map_path}"))?,
        None => {
            warn!(path = %map_path, "no map file; starting with an empty city");
            CityMap::empty()
        }
    };

    let scenario: Option<ScenarioDoc> = match read_if_present(&scenario_path)? {
        Some(json) => {
            Some(serde_json::from_str(&json).with_context(|| format!("parsing {scenario_path}"))?)
        }
        None => None,
    };

    let services = Services::open(map, config.clone())?;
    let cluster = Cluster::new(services.clone());

    // The feed runs for the life of the process.
    let ws_bind = config.ws_bind.clone();
    let viz = services.viz.clone();
    tokio::spawn(async move {
        if let Err(e) = ws::serve(ws_bind, viz).await {
            warn!(error = %e, "visualization feed stopped");
        }
    });

    // Bind every immovable to its map record.
    let immovables = services.map.immovable_ids();
    info!(count = immovables.len(), "injecting identities");
    for id in immovables {
        cluster.tell(injector(), id.clone(), Command::Identity { id });
    }

    // Seed the mobiles.
    if let Some(scenario) = scenario {
        info!(count = scenario.mobiles.len(), "seeding mobiles");
        for seed in &scenario.mobiles {
            let spec = seed
                .to_spec()
                .with_context(|| format!("building route for {}", seed.id))?;
            cluster.tell(
                injector(),
                seed.host.clone(),
                Command::CreateMobileEntity { id: seed.id.clone(), spec },
            );
        }
    }

    // Drive the clock until the configured end (or ctrl-c).
    tokio::select! {
        _ = services.time.drive(&config) => {
            info!("simulation finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
        }
    }
    cluster.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests;
