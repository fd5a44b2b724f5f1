use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use notify_debouncer_full::{
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap,
};
use zetta_shared::{
    crossbeam_channel::Receiver,
    log::{error, info, trace, warn},
    parking_lot::Mutex,
    uuid::Uuid,
    walkdir::WalkDir,
};

use crate::{
    common::{is_asset_file, is_older, modified_system_time},
    config::ContentConfig,
    observers::Observers,
    read_asset_info, AssetInfo, Error, Result, WatchControl,
};

/// Changes of the registry that are sent to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A file has been added to the registry.
    Registered(PathBuf),
    /// A registered file has been written since it was registered.
    Updated(PathBuf),
    /// A registered file doesn't exist anymore.
    Unregistered(PathBuf),
}

#[derive(Default)]
struct RegistryIndex {
    by_path: BTreeMap<PathBuf, AssetInfo>,
    by_guid: HashMap<Uuid, PathBuf>,
}

struct RegistryState {
    content_folder: Mutex<Option<PathBuf>>,
    index: Mutex<RegistryIndex>,
    active: AtomicBool,
    observers: Observers<RegistryEvent>,
}

/// Live index of all asset files in a content folder.
///
/// [`AssetRegistry::reset`] scans the content folder and then watches it for changes. File
/// system events are debounced and every batch of events results in a single update pass over
/// the index, so there are never two passes running at the same time.
pub struct AssetRegistry {
    state: Arc<RegistryState>,
    debounce: Duration,
    watcher: Mutex<Option<Debouncer<RecommendedWatcher, FileIdMap>>>,
}

impl AssetRegistry {
    /// Creates an empty registry. Call [`AssetRegistry::reset`] to start tracking a content folder.
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: Arc::new(RegistryState {
                content_folder: Mutex::new(None),
                index: Mutex::new(RegistryIndex::default()),
                active: AtomicBool::new(true),
                observers: Observers::default(),
            }),
            debounce,
            watcher: Mutex::new(None),
        }
    }

    /// Creates a registry for the content folder of the configuration and scans it.
    pub fn from_config(config: &ContentConfig) -> Result<Self> {
        let registry = Self::new(config.registry_debounce());
        registry.reset(&config.content_path)?;
        Ok(registry)
    }

    /// Rebuilds the index from scratch by scanning `content_folder` recursively. The folder is
    /// watched for changes only after the scan has completed.
    pub fn reset(&self, content_folder: &Path) -> Result<()> {
        // Stop the watcher of the previous folder.
        drop(self.watcher.lock().take());

        if !content_folder.is_dir() {
            error!("Content folder doesn't exist: '{}'", content_folder.display());
            return Err(Error::FileNotFound(content_folder.to_owned()));
        }
        let content_folder = content_folder.canonicalize()?;
        info!("Resetting AssetRegistry for '{}'", content_folder.display());

        {
            let mut index = self.state.index.lock();
            for path in index.by_path.keys() {
                self.state.notify(RegistryEvent::Unregistered(path.clone()));
            }
            *index = RegistryIndex::default();
            self.state.register_all(&mut index, &content_folder);
            info!("Registered {} assets in '{}'", index.by_path.len(), content_folder.display());
        }
        *self.state.content_folder.lock() = Some(content_folder.clone());
        self.state.active.store(true, Ordering::SeqCst);

        let state = self.state.clone();
        let watch_fn = move |result: DebounceEventResult| match result {
            Ok(events) => state.handle_events(&events),
            Err(err) => {
                let errs = err.into_iter().map(|err| err.to_string()).collect::<Vec<_>>().join(", ");
                error!("Failed to receive events from file watcher: {errs}");
            }
        };
        let mut watcher = notify_debouncer_full::new_debouncer(self.debounce, None, watch_fn)
            .map_err(|_| Error::FailedToStartDirectoryWatcher(content_folder.clone()))?;
        watcher
            .watcher()
            .watch(&content_folder, RecursiveMode::Recursive)
            .map_err(|_| Error::FailedToStartDirectoryWatcher(content_folder.clone()))?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Scans the content folder again without clearing the index.
    pub fn refresh(&self) {
        let Some(content_folder) = self.content_folder() else {
            trace!("AssetRegistry has no content folder to refresh");
            return;
        };
        let mut index = self.state.index.lock();
        self.state.register_all(&mut index, &content_folder);
        self.state.sweep(&mut index);
    }

    /// Either sets the watcher to active or inactive. Events of an inactive watcher are dropped
    /// and the content folder is scanned when it becomes active again.
    pub fn set_active(&self, active: bool) {
        let was_active = self.state.active.swap(active, Ordering::SeqCst);
        info!("AssetRegistry watcher is now {}", if active { "active" } else { "inactive" });
        if active && !was_active {
            self.refresh();
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn content_folder(&self) -> Option<PathBuf> {
        self.state.content_folder.lock().clone()
    }

    /// Returns the [`AssetInfo`] of the file at `path`.
    pub fn get_by_path(&self, path: &Path) -> Option<AssetInfo> {
        let index = self.state.index.lock();
        if let Some(info) = index.by_path.get(path) {
            return Some(info.clone());
        }
        let canonical = path.canonicalize().ok()?;
        index.by_path.get(&canonical).cloned()
    }

    /// Returns the [`AssetInfo`] of the file with the given GUID.
    pub fn get_by_guid(&self, guid: Uuid) -> Option<AssetInfo> {
        let index = self.state.index.lock();
        index.by_guid.get(&guid).and_then(|path| index.by_path.get(path)).cloned()
    }

    /// Returns all registered assets ordered by path.
    pub fn assets(&self) -> Vec<AssetInfo> {
        self.state.index.lock().by_path.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.index.lock().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a channel that can be used to observe [`RegistryEvent`]s.
    pub fn observe(&self) -> Receiver<RegistryEvent> {
        self.state.observers.observe()
    }
}

impl WatchControl for AssetRegistry {
    fn suspend_watching(&self) {
        self.set_active(false);
    }

    fn resume_watching(&self) {
        self.set_active(true);
    }
}

impl RegistryState {
    fn handle_events(&self, events: &[DebouncedEvent]) {
        let mut paths = BTreeSet::new();
        for event in events {
            let event_name = event_name(event);
            if matches!(event.kind, EventKind::Access(_)) {
                continue;
            }
            for path in &event.paths {
                let relevant = is_asset_file(path) || path.is_dir() || matches!(event.kind, EventKind::Remove(_));
                if !relevant {
                    continue;
                }
                if !self.active.load(Ordering::SeqCst) {
                    info!("Watcher is inactive and reported '{event_name}' event for path '{}'", path.display());
                    continue;
                }
                trace!("Watcher is active and reported '{event_name}' event for path '{}'", path.display());
                paths.insert(path.clone());
            }
        }
        if paths.is_empty() {
            return;
        }

        let mut index = self.index.lock();
        for path in &paths {
            if path.is_dir() {
                self.register_all(&mut index, path);
            } else if path.exists() && is_asset_file(path) {
                self.register(&mut index, path);
            }
        }
        self.sweep(&mut index);
    }

    fn register_all(&self, index: &mut RegistryIndex, folder: &Path) {
        for entry in WalkDir::new(folder) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Failed to read directory entry in '{}': {err}", folder.display());
                    continue;
                }
            };
            if entry.file_type().is_file() && is_asset_file(entry.path()) {
                self.register(index, entry.path());
            }
        }
    }

    /// Adds the file to the index or replaces its entry when the file has been written since it was registered.
    fn register(&self, index: &mut RegistryIndex, path: &Path) {
        let previous_guid = match index.by_path.get(path) {
            Some(existing) => {
                let modified = modified_system_time(path);
                if !modified.is_some_and(|modified| is_older(existing.register_time, modified)) {
                    trace!("Asset is up to date: '{}'", path.display());
                    return;
                }
                Some(existing.guid)
            }
            None => None,
        };

        let info = match read_asset_info(path) {
            Ok(info) => info,
            Err(err) => {
                warn!("Failed to register asset '{}': {err}", path.display());
                return;
            }
        };
        if let Some(previous_guid) = previous_guid {
            index.by_guid.remove(&previous_guid);
        }
        if let Some(other_path) = index.by_guid.get(&info.guid).filter(|other_path| other_path.as_path() != path) {
            warn!(
                "Asset '{}' has the same guid {} as '{}'",
                path.display(),
                info.guid,
                other_path.display()
            );
        }
        index.by_guid.insert(info.guid, path.to_owned());
        index.by_path.insert(path.to_owned(), info);

        if previous_guid.is_some() {
            info!("Updated asset '{}'", path.display());
            self.notify(RegistryEvent::Updated(path.to_owned()));
        } else {
            info!("Registered asset '{}'", path.display());
            self.notify(RegistryEvent::Registered(path.to_owned()));
        }
    }

    /// Removes all entries whose files don't exist anymore.
    fn sweep(&self, index: &mut RegistryIndex) {
        let missing = index.by_path.keys().filter(|path| !path.exists()).cloned().collect::<Vec<_>>();
        for path in missing {
            if let Some(info) = index.by_path.remove(&path) {
                if index.by_guid.get(&info.guid) == Some(&path) {
                    index.by_guid.remove(&info.guid);
                }
            }
            info!("Unregistered asset '{}'", path.display());
            self.notify(RegistryEvent::Unregistered(path));
        }
    }

    fn notify(&self, event: RegistryEvent) {
        self.observers.publish(event);
    }
}

fn event_name(event: &DebouncedEvent) -> &str {
    match &event.kind {
        EventKind::Any => "Any",
        EventKind::Access(_) => "Access",
        EventKind::Create(_) => "Create",
        EventKind::Modify(_) => "Modify",
        EventKind::Remove(_) => "Remove",
        EventKind::Other => "Other",
    }
}
