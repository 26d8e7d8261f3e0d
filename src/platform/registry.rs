// Platform registry: platform -> (profile, fetcher)

use std::collections::HashMap;
use std::sync::Arc;

use super::{Platform, PlatformOverride, PlatformProfile};
use crate::caption::CaptionConfig;
use crate::config::Settings;
use crate::downloader::traits::VideoFetcher;

#[derive(Clone)]
pub struct PlatformEntry {
    pub profile: PlatformProfile,
    pub fetcher: Arc<dyn VideoFetcher>,
}

/// Immutable dispatch table, shared across download tasks
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    entries: HashMap<Platform, PlatformEntry>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, profile: PlatformProfile, fetcher: Arc<dyn VideoFetcher>) {
        self.entries
            .insert(profile.platform, PlatformEntry { profile, fetcher });
    }

    /// Every platform backed by the same fetcher, profiles from settings
    pub fn uniform(
        settings: &Settings,
        overrides: &HashMap<Platform, PlatformOverride>,
        fetcher: Arc<dyn VideoFetcher>,
    ) -> Self {
        let mut registry = Self::new();
        for platform in Platform::ALL {
            let profile = PlatformProfile::new(platform, settings, overrides.get(&platform));
            registry.register(profile, fetcher.clone());
        }
        registry
    }

    pub fn get(&self, platform: Platform) -> Option<&PlatformEntry> {
        self.entries.get(&platform)
    }

    /// Caption templates from the profiles, default for the rest
    pub fn caption_config(&self) -> CaptionConfig {
        self.entries
            .values()
            .filter_map(|e| {
                e.profile
                    .caption_template
                    .as_ref()
                    .map(|t| (e.profile.platform, t.clone()))
            })
            .fold(CaptionConfig::default(), |config, (platform, template)| {
                config.with_template(platform, template)
            })
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(p, e)| (p.as_str(), e.fetcher.name())),
            )
            .finish()
    }
}
