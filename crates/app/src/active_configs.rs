//! Active configurations: the logic each channel is currently evaluated
//! with.
//!
//! Written by the logic version service whenever a version is saved; read by
//! every evaluation tick without touching storage.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use greenhub_domain::channel::ChannelId;
use greenhub_domain::logic::LogicConfiguration;

#[derive(Debug, Default)]
pub struct ActiveConfigs {
    configs: RwLock<HashMap<ChannelId, LogicConfiguration>>,
}

impl ActiveConfigs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, channel: &ChannelId) -> Option<LogicConfiguration> {
        let configs = self.configs.read().unwrap_or_else(PoisonError::into_inner);
        configs.get(channel).cloned()
    }

    pub fn set(&self, channel: ChannelId, config: LogicConfiguration) {
        let mut configs = self.configs.write().unwrap_or_else(PoisonError::into_inner);
        configs.insert(channel, config);
    }

    pub fn remove(&self, channel: &ChannelId) -> Option<LogicConfiguration> {
        let mut configs = self.configs.write().unwrap_or_else(PoisonError::into_inner);
        configs.remove(channel)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenhub_domain::id::DeviceId;

    #[test]
    fn should_replace_configuration_for_channel() {
        let configs = ActiveConfigs::new();
        let id = ChannelId::new(DeviceId::new("esp32-a").unwrap(), 5);
        configs.set(id.clone(), LogicConfiguration::default());
        let disabled = LogicConfiguration {
            enabled: false,
            ..LogicConfiguration::default()
        };
        configs.set(id.clone(), disabled.clone());
        assert_eq!(configs.get(&id), Some(disabled));
        assert_eq!(configs.len(), 1);
        assert!(configs.remove(&id).is_some());
        assert!(configs.is_empty());
    }
}
