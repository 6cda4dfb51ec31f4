//! Startup resolution of configured paths against the resource registry.

use crate::client::models::ResourceRepresentation;
use crate::config::{EnforcementMode, EnforcerConfig, PathConfig};
use crate::error::EnforcerError;
use crate::paths::ResourceFinder;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;

/// Build the initial path table.
///
/// When paths are not loaded lazily and no path is actively enforced, every
/// resource of the resource server is fetched up front. Configured paths are
/// then resolved to their resources and take precedence over loaded ones.
/// A path that cannot be resolved is logged and left out.
pub async fn configure_paths(
    config: &EnforcerConfig,
    finder: &dyn ResourceFinder,
) -> BTreeMap<String, PathConfig> {
    let mut table = BTreeMap::new();

    let load_all = !config.lazy_load_paths
        && config
            .paths
            .iter()
            .all(|path| path.enforcement_mode == EnforcementMode::Disabled);
    if load_all {
        table = load_all_paths(finder).await;
    }

    let mut configured: BTreeMap<String, PathConfig> = BTreeMap::new();
    for path in &config.paths {
        match resolve_path(path.clone(), config.lazy_load_paths, finder).await {
            Ok(resolved) => match configured.get_mut(&resolved.path) {
                Some(existing) => existing.merge(resolved),
                None => {
                    configured.insert(resolved.path.clone(), resolved);
                }
            },
            Err(e) => error!("Skipping path [{}]: {}", path.path, e),
        }
    }

    table.extend(configured);
    info!("Configured {} protected path(s)", table.len());
    table
}

async fn load_all_paths(finder: &dyn ResourceFinder) -> BTreeMap<String, PathConfig> {
    let mut table = BTreeMap::new();
    let ids = match finder.find_all_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            error!("Failed to load resources from the authorization server: {}", e);
            return table;
        }
    };

    debug!("Loading {} resource(s) from the authorization server", ids.len());
    for id in ids {
        match finder.find_by_id(&id).await {
            Ok(resource) => {
                for path in PathConfig::from_resource(&resource) {
                    table.insert(path.path.clone(), path);
                }
            }
            Err(e) => error!("Failed to load resource {}: {}", id, e),
        }
    }
    table
}

async fn resolve_path(
    mut path: PathConfig,
    lazy_load: bool,
    finder: &dyn ResourceFinder,
) -> Result<PathConfig, EnforcerError> {
    let disabled = path.enforcement_mode == EnforcementMode::Disabled;
    if disabled {
        path.is_static = true;
    }
    if path.id.is_some() {
        return Ok(path);
    }

    let lookup = match path.name.clone() {
        Some(name) => finder
            .find_by_name(&name)
            .await
            .map(|found| {
                if found.is_some() {
                    path.is_static = true;
                }
                found
            })
            .map_err(EnforcerError::from),
        None => find_by_path(&path.path, finder).await,
    };

    let resource = match lookup {
        Ok(resource) => resource,
        Err(e) if disabled => {
            warn!("Could not resolve disabled path [{}]: {}", path.path, e);
            None
        }
        Err(e) => return Err(e),
    };

    match resource {
        Some(resource) => {
            path.id = resource.id.clone();
            if path.name.is_none() {
                path.name = resource.name.clone();
            }
            if path.resource_type.is_none() {
                path.resource_type = resource.resource_type.clone();
            }
            if path.scopes.is_empty() {
                path.scopes = resource.scope_names();
            }
        }
        None if disabled => {}
        // Looked up again on first use
        None if lazy_load => path.invalidated = true,
        None => {
            return Err(EnforcerError::Config(format!(
                "no resource found for path [{}]",
                path.path
            )));
        }
    }
    Ok(path)
}

async fn find_by_path(
    path: &str,
    finder: &dyn ResourceFinder,
) -> Result<Option<ResourceRepresentation>, EnforcerError> {
    let mut found = finder.find_by_uri(path).await?;
    if found.is_empty() {
        found = finder.find_by_matching_uri(path).await?;
    }
    if found.len() > 1 {
        return Err(EnforcerError::Config(format!(
            "{} resources match path [{}], expected one",
            found.len(),
            path
        )));
    }
    Ok(found.into_iter().next())
}
