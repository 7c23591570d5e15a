use std::collections::BTreeMap;

use super::types::{
    EnableOptions, EventCommand, ProviderConfig, SerializationFormat, SessionConfig,
};

/// Net enablement state per provider, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, EnableOptions>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &mut self,
        provider_name: &str,
        command: EventCommand,
        options: Option<EnableOptions>,
    ) {
        match command {
            EventCommand::Enable => {
                self.providers
                    .insert(provider_name.to_string(), options.unwrap_or_default());
            }
            EventCommand::Disable => {
                self.providers.remove(provider_name);
            }
        }
    }

    pub fn get(&self, provider_name: &str) -> Option<&EnableOptions> {
        self.providers.get(provider_name)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnableOptions)> {
        self.providers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        self.iter()
            .map(|(name, opts)| ProviderConfig {
                name: name.to_string(),
                keywords: opts.keywords,
                level: opts.level,
                filter_arguments: opts.filter_arguments.clone(),
            })
            .collect()
    }

    /// Full session configuration; every registered provider is included.
    pub fn session_config(&self, circular_buffer_mb: u32, request_rundown: bool) -> SessionConfig {
        SessionConfig {
            circular_buffer_mb,
            format: SerializationFormat::Jsonl,
            request_rundown,
            providers: self.provider_configs(),
        }
    }
}
