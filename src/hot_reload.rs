// Config hot reload
//
// Watches the directory holding config.toml (editors often replace the file
// rather than write it in place) and re-reads the file when it changes. Only
// settings that can be applied to a running renderer are reported.

use anyhow::{Context, Result};
use ash::vk;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, TryRecvError};

use frame_pacer::config::Config;

/// Live-applicable differences between two configs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigUpdate {
    /// Needs a swapchain rebuild to take effect.
    pub present_mode: Option<vk::PresentModeKHR>,
    pub clear_color: Option<[f32; 4]>,
}

impl ConfigUpdate {
    pub fn between(old: &Config, new: &Config) -> Self {
        let present_mode = new.present_mode();
        Self {
            present_mode: (present_mode != old.present_mode()).then_some(present_mode),
            clear_color: (new.graphics.clear_color != old.graphics.clear_color)
                .then_some(new.graphics.clear_color),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.present_mode.is_none() && self.clear_color.is_none()
    }
}

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    path: PathBuf,
    current: Config,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>, current: Config) -> Result<Self> {
        let path = path.into();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, events) = channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means the app is shutting down.
            let _ = tx.send(res);
        })
        .context("Failed to create file watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", dir))?;

        log::info!("Watching {:?} for changes", path);
        Ok(Self {
            _watcher: watcher,
            events,
            path,
            current,
        })
    }

    /// Drains pending file events; on a change to the config file re-reads it
    /// and returns what differs from the last good config.
    pub fn poll(&mut self) -> Option<ConfigUpdate> {
        let mut touched = false;
        loop {
            match self.events.try_recv() {
                Ok(Ok(event)) => touched |= concerns(&event, &self.path),
                Ok(Err(e)) => log::warn!("Config watcher error: {}", e),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if !touched {
            return None;
        }

        let new = match Config::load_from_path(&self.path) {
            Ok(config) => config,
            Err(e) => {
                // Keep running with the last good config.
                log::warn!("Ignoring config change: {:#}", e);
                return None;
            }
        };
        let update = ConfigUpdate::between(&self.current, &new);
        self.current = new;
        if update.is_empty() {
            log::debug!("Config changed, nothing to apply at runtime");
            return None;
        }
        log::info!("Config reloaded: {:?}", update);
        Some(update)
    }
}

fn concerns(event: &Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == path.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn reports_only_changed_live_settings() {
        let old = Config::default();
        let mut new = old.clone();
        assert!(ConfigUpdate::between(&old, &new).is_empty());

        new.graphics.present_mode = "mailbox".into();
        new.window.title = "renamed".into();
        assert_eq!(
            ConfigUpdate::between(&old, &new),
            ConfigUpdate {
                present_mode: Some(vk::PresentModeKHR::MAILBOX),
                clear_color: None,
            }
        );

        new.graphics.present_mode = old.graphics.present_mode.clone();
        new.graphics.clear_color = [0.0, 0.0, 0.0, 1.0];
        assert_eq!(
            ConfigUpdate::between(&old, &new).clear_color,
            Some([0.0, 0.0, 0.0, 1.0])
        );
    }

    #[test]
    fn spelling_of_the_same_mode_is_not_a_change() {
        let old = Config::default();
        let mut new = old.clone();
        new.graphics.present_mode = "FIFO".into();
        assert!(ConfigUpdate::between(&old, &new).is_empty());
    }

    #[test]
    fn only_writes_to_the_config_file_count() {
        let path = Path::new("conf/config.toml");
        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/abs/conf/config.toml"));
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("config.toml"));
        let other = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("conf/other.toml"));
        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("config.toml"));

        assert!(concerns(&modify, path));
        assert!(concerns(&create, path));
        assert!(!concerns(&other, path));
        assert!(!concerns(&removed, path));
    }
}
