use crate::config::{EnforcementMode, PathCacheConfig, PathConfig};
use crate::client::models::ResourceRepresentation;
use crate::paths::cache::{CacheLookup, PathCache};
use crate::paths::pattern::{match_pattern, MatchKind};
use crate::paths::ResourceFinder;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Resolves request paths to their [`PathConfig`].
///
/// Configured paths live in a table keyed by pattern. Lookups go through the
/// path cache first, then local pattern matching, and finally the resource
/// registry when the local answer is missing, invalidated or only a wildcard.
pub struct PathMatcher {
    table: RwLock<BTreeMap<String, PathConfig>>,
    cache: PathCache,
    finder: Arc<dyn ResourceFinder>,
    remote_lookup: bool,
}

impl PathMatcher {
    pub fn new(
        paths: BTreeMap<String, PathConfig>,
        cache_config: &PathCacheConfig,
        remote_lookup: bool,
        finder: Arc<dyn ResourceFinder>,
    ) -> Self {
        Self {
            table: RwLock::new(paths),
            cache: PathCache::new(cache_config),
            finder,
            remote_lookup,
        }
    }

    pub async fn match_path(&self, path: &str) -> Option<PathConfig> {
        match self.cache.get(path).await {
            CacheLookup::Hit(config) => return Some(config),
            CacheLookup::Negative => return None,
            CacheLookup::Expired => self.invalidate(path).await,
            CacheLookup::Miss => {}
        }

        let local = self.match_local(path).await;
        let needs_remote = match &local {
            None => true,
            Some((config, kind)) => config.invalidated || *kind == MatchKind::Wildcard,
        };
        let local = local.map(|(config, _)| config);

        if self.remote_lookup && needs_remote {
            return match self.finder.find_by_matching_uri(path).await {
                Ok(resources) => self.reconcile(path, local, resources).await,
                Err(e) => {
                    warn!("Failed to look up resources for path {}: {}", path, e);
                    None
                }
            };
        }

        self.cache.put(path, local.clone()).await;
        local
    }

    pub async fn remove_from_cache(&self, path: &str) {
        debug!("Evicting cached configuration for {}", path);
        self.cache.remove(path).await;
    }

    #[cfg(test)]
    pub(crate) async fn cached(&self, path: &str) -> CacheLookup {
        self.cache.get(path).await
    }

    /// Snapshot of the configured path table.
    pub async fn configured_paths(&self) -> Vec<PathConfig> {
        self.table.read().await.values().cloned().collect()
    }

    async fn invalidate(&self, path: &str) {
        let mut table = self.table.write().await;
        if let Some(config) = table.get(path) {
            if !config.is_static {
                debug!("Invalidating configuration for path {}", path);
                let mut replacement = config.clone();
                replacement.invalidated = true;
                table.insert(path.to_string(), replacement);
            }
        }
    }

    async fn match_local(&self, path: &str) -> Option<(PathConfig, MatchKind)> {
        let table = self.table.read().await;
        let (config, matched) = table
            .values()
            .filter_map(|config| match_pattern(&config.path, path).map(|m| (config, m)))
            .min_by(|(a, ma), (b, mb)| ma.specificity(mb).then_with(|| a.path.cmp(&b.path)))?;

        let resolved = match matched.kind {
            MatchKind::Template => PathConfig::instance(Arc::new(config.clone()), path),
            _ => config.clone(),
        };
        Some((resolved, matched.kind))
    }

    async fn reconcile(
        &self,
        path: &str,
        local: Option<PathConfig>,
        resources: Vec<ResourceRepresentation>,
    ) -> Option<PathConfig> {
        let Some(resource) = resources.into_iter().next() else {
            if let Some(config) = &local {
                if config.invalidated && !config.is_static {
                    debug!("Removing stale configuration for path {}", config.path);
                    self.table.write().await.remove(&config.path);
                    return None;
                }
            }
            self.cache.put(path, local.clone()).await;
            return local;
        };

        if local.is_none() && self.is_owned_by_static_path(&resource).await {
            return None;
        }

        let mut fresh = PathConfig::from_resource(&resource)
            .into_iter()
            .next()
            .unwrap_or_else(|| PathConfig {
                id: resource.id.clone(),
                name: resource.name.clone(),
                resource_type: resource.resource_type.clone(),
                path: path.to_string(),
                scopes: resource.scope_names(),
                ..Default::default()
            });

        if let Some(local) = &local {
            fresh.claim_information_point = local.claim_information_point.clone();
            fresh.methods = local.methods.clone();
            fresh.is_static = local.is_static;
            fresh.enforcement_mode = local.enforcement_mode;
            fresh.parent = local.parent.clone();

            if local.invalidated {
                let mut replacement = fresh.clone();
                replacement.path = local.path.clone();
                self.table.write().await.insert(local.path.clone(), replacement);
            }
        }

        debug!(
            "Resolved path {} to resource {:?}",
            path,
            fresh.id.as_deref().unwrap_or_default()
        );
        self.cache.put(path, Some(fresh.clone())).await;
        Some(fresh)
    }

    async fn is_owned_by_static_path(&self, resource: &ResourceRepresentation) -> bool {
        let Some(id) = resource.id.as_deref() else {
            return false;
        };
        self.table.read().await.values().any(|config| {
            config.id.as_deref() == Some(id)
                && config.is_static
                && config.enforcement_mode != EnforcementMode::Disabled
        })
    }
}
