use std::{
    collections::BTreeSet,
    ffi::OsString,
    fmt, fs,
    path::{Path, PathBuf, MAIN_SEPARATOR},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use zetta_shared::{
    crossbeam_channel::{self, Receiver},
    log::{error, info, trace, warn},
    parking_lot::Mutex,
    rayon::{ThreadPool, ThreadPoolBuilder},
};

use crate::{
    common::{extract_extension_from_path, extract_file_stem_from_path},
    config::ContentConfig,
    content_tools::ContentTools,
    geometry::{Geometry, GeometryImportSettings},
    observers::Observers,
    texture::{Texture, TextureImportSettings},
    Asset, AssetType, Error, Result, ASSET_FILE_EXTENSION,
};

const MESH_EXTENSIONS: &[&str] = &["fbx"];
const IMAGE_EXTENSIONS: &[&str] = &["bmp", "png", "jpg", "jpeg", "tif", "tiff", "tga", "dds", "hdr"];
const AUDIO_EXTENSIONS: &[&str] = &["ogg", "wav"];

/// Returns the type of asset that a source file with the given extension is imported as.
///
/// # Example
///
/// ```rust
/// use zetta_content::{asset_type_for_extension, AssetType};
/// assert_eq!(asset_type_for_extension("PNG"), Some(AssetType::Texture));
/// assert_eq!(asset_type_for_extension("xyz"), None);
/// ```
pub fn asset_type_for_extension(extension: &str) -> Option<AssetType> {
    let extension = extension.to_lowercase();
    if MESH_EXTENSIONS.contains(&extension.as_str()) {
        Some(AssetType::Mesh)
    } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Some(AssetType::Texture)
    } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
        Some(AssetType::Audio)
    } else {
        None
    }
}

/// Source file together with the destination and the settings it's imported with.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetProxy {
    Geometry {
        file: PathBuf,
        destination: PathBuf,
        settings: GeometryImportSettings,
    },
    Texture {
        file: PathBuf,
        destination: PathBuf,
        settings: TextureImportSettings,
    },
    Audio {
        file: PathBuf,
        destination: PathBuf,
    },
}

impl AssetProxy {
    /// Creates a proxy with default settings. Returns `None` for unsupported extensions.
    pub fn new(file: &Path, destination: &Path) -> Option<Self> {
        let extension = extract_extension_from_path(file).ok()?;
        let file = file.to_owned();
        let destination = destination_folder(destination);
        match asset_type_for_extension(&extension)? {
            AssetType::Mesh => Some(AssetProxy::Geometry {
                file,
                destination,
                settings: GeometryImportSettings::default(),
            }),
            AssetType::Texture => Some(AssetProxy::Texture {
                file,
                destination,
                settings: TextureImportSettings::default(),
            }),
            AssetType::Audio => Some(AssetProxy::Audio { file, destination }),
            _ => None,
        }
    }

    pub fn file(&self) -> &Path {
        match self {
            AssetProxy::Geometry { file, .. } | AssetProxy::Texture { file, .. } | AssetProxy::Audio { file, .. } => file,
        }
    }

    pub fn destination(&self) -> &Path {
        match self {
            AssetProxy::Geometry { destination, .. }
            | AssetProxy::Texture { destination, .. }
            | AssetProxy::Audio { destination, .. } => destination,
        }
    }

    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetProxy::Geometry { .. } => AssetType::Mesh,
            AssetProxy::Texture { .. } => AssetType::Texture,
            AssetProxy::Audio { .. } => AssetType::Audio,
        }
    }

    /// Path of the asset file that the import writes.
    pub fn output_path(&self) -> Result<PathBuf> {
        let file_stem = extract_file_stem_from_path(self.file())?;
        Ok(self.destination().join(format!("{file_stem}.{ASSET_FILE_EXTENSION}")))
    }
}

/// Creates one proxy per supported file. Duplicates and unsupported files are skipped.
pub fn create_proxies(files: &[PathBuf], destination: &Path) -> Vec<AssetProxy> {
    let mut seen = BTreeSet::new();
    let mut proxies = Vec::new();
    for file in files {
        if !seen.insert(file.clone()) {
            trace!("Skipping duplicate file '{}'", file.display());
            continue;
        }
        match AssetProxy::new(file, destination) {
            Some(proxy) => proxies.push(proxy),
            None => info!("Skipping file with unsupported extension: '{}'", file.display()),
        }
    }
    proxies
}

/// Appends a separator to the folder if it doesn't end with one.
fn destination_folder(destination: &Path) -> PathBuf {
    let mut folder = OsString::from(destination.as_os_str());
    if !folder.to_string_lossy().ends_with(['/', MAIN_SEPARATOR]) {
        folder.push(MAIN_SEPARATOR.to_string());
    }
    PathBuf::from(folder)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Importing,
    Succeeded,
    Failed,
}

impl ImportStatus {
    pub fn is_finished(self) -> bool {
        self != ImportStatus::Importing
    }
}

#[derive(Debug)]
struct ItemState {
    status: ImportStatus,
    duration: Option<Duration>,
    progress_value: f32,
    progress_max: f32,
}

/// Tracks a single import from start to end.
///
/// Items are identified by the full path of their source. Sources with the same file name in
/// different folders are tracked separately.
#[derive(Debug)]
pub struct ImportingItem {
    source: PathBuf,
    name: String,
    asset_type: AssetType,
    start: Instant,
    state: Mutex<ItemState>,
}

impl ImportingItem {
    pub fn new(source: impl Into<PathBuf>, asset_type: AssetType) -> Self {
        let source = source.into();
        let name = source
            .file_name()
            .map(|file_name| file_name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            source,
            name,
            asset_type,
            start: Instant::now(),
            state: Mutex::new(ItemState {
                status: ImportStatus::Importing,
                duration: None,
                progress_value: 0.0,
                progress_max: 1.0,
            }),
        }
    }

    /// Source file of the import.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// File name of the source for display.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    pub fn status(&self) -> ImportStatus {
        self.state.lock().status
    }

    /// Changes the status. A finished import can't change its status anymore, in which case
    /// `false` is returned.
    pub fn set_status(&self, status: ImportStatus) -> bool {
        let mut state = self.state.lock();
        if state.status.is_finished() {
            warn!(
                "Status of import '{}' can't change from {:?} to {status:?}",
                self.name, state.status
            );
            return false;
        }
        state.status = status;
        if status.is_finished() {
            state.duration = Some(self.start.elapsed());
        }
        true
    }

    /// Time since the import started. Stops counting when the import has finished.
    pub fn duration(&self) -> Duration {
        self.state.lock().duration.unwrap_or_else(|| self.start.elapsed())
    }

    pub fn set_progress(&self, value: f32, max: f32) {
        let mut state = self.state.lock();
        state.progress_value = value;
        state.progress_max = max;
    }

    /// Progress normalized to `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        let state = self.state.lock();
        if state.progress_max <= 0.0 {
            return 0.0;
        }
        (state.progress_value / state.progress_max).clamp(0.0, 1.0)
    }
}

impl fmt::Display for ImportingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:?}, {}]", self.name, self.status(), format_duration(self.duration()))
    }
}

/// Formats the duration as `mm:ss:cc` where `cc` are centiseconds.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use zetta_content::format_duration;
/// assert_eq!(format_duration(Duration::from_millis(61_230)), "01:01:23");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total_seconds / 60,
        total_seconds % 60,
        duration.subsec_millis() / 10
    )
}

/// Changes of the [`ImportingItems`] collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    Added { source: PathBuf, asset_type: AssetType },
    StatusChanged { source: PathBuf, status: ImportStatus },
    Removed { source: PathBuf },
}

/// Imports that are running or have finished.
#[derive(Default)]
pub struct ImportingItems {
    items: Mutex<Vec<Arc<ImportingItem>>>,
    observers: Observers<ImportEvent>,
}

impl ImportingItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, item: ImportingItem) -> Arc<ImportingItem> {
        let item = Arc::new(item);
        self.items.lock().push(item.clone());
        self.observers.publish(ImportEvent::Added {
            source: item.source().to_owned(),
            asset_type: item.asset_type(),
        });
        item
    }

    /// Sets the status of the item and notifies the observers when the status changed.
    pub fn set_status(&self, item: &ImportingItem, status: ImportStatus) -> bool {
        let changed = item.set_status(status);
        if changed {
            self.observers.publish(ImportEvent::StatusChanged {
                source: item.source().to_owned(),
                status,
            });
        }
        changed
    }

    pub fn remove(&self, source: &Path) -> Option<Arc<ImportingItem>> {
        let removed = {
            let mut items = self.items.lock();
            let index = items.iter().position(|item| item.source() == source)?;
            items.remove(index)
        };
        self.observers.publish(ImportEvent::Removed {
            source: source.to_owned(),
        });
        Some(removed)
    }

    /// Removes all items of the given type or all items when `asset_type` is `None`.
    pub fn clear(&self, asset_type: Option<AssetType>) {
        let removed = {
            let mut items = self.items.lock();
            let (removed, kept) = items
                .drain(..)
                .partition::<Vec<_>, _>(|item| asset_type.map_or(true, |asset_type| item.asset_type() == asset_type));
            *items = kept;
            removed
        };
        for item in removed {
            self.observers.publish(ImportEvent::Removed {
                source: item.source().to_owned(),
            });
        }
    }

    /// Returns the most recent item that imports `source`.
    pub fn get(&self, source: &Path) -> Option<Arc<ImportingItem>> {
        self.items.lock().iter().rev().find(|item| item.source() == source).cloned()
    }

    /// Returns the items of the given type or all items when `asset_type` is `None`.
    pub fn items(&self, asset_type: Option<AssetType>) -> Vec<Arc<ImportingItem>> {
        self.items
            .lock()
            .iter()
            .filter(|item| asset_type.map_or(true, |asset_type| item.asset_type() == asset_type))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observe(&self) -> Receiver<ImportEvent> {
        self.observers.observe()
    }
}

/// Something that watches the content folder and has to ignore the files that an import writes.
pub trait WatchControl: Send + Sync {
    fn suspend_watching(&self);
    fn resume_watching(&self);
}

/// Result of [`ContentImporter::import_files`].
#[derive(Debug, Default)]
pub struct ImportBatch {
    pub items: Vec<Arc<ImportingItem>>,
    /// Asset files that have been written.
    pub saved_files: Vec<PathBuf>,
    /// Source files that couldn't be imported.
    pub failed_files: Vec<PathBuf>,
}

struct ProxyOutcome {
    proxy: AssetProxy,
    result: Result<ImportedFiles>,
}

#[derive(Default)]
struct ImportedFiles {
    saved_files: Vec<PathBuf>,
    embedded_textures: Vec<PathBuf>,
}

/// Imports batches of source files concurrently.
#[derive(Clone)]
pub struct ContentImporter {
    tools: Arc<dyn ContentTools>,
    thread_pool: Arc<ThreadPool>,
    items: Arc<ImportingItems>,
    watch_control: Option<Arc<dyn WatchControl>>,
    running_batches: Arc<Mutex<usize>>,
    temp_path: PathBuf,
}

impl ContentImporter {
    pub fn new(tools: Arc<dyn ContentTools>, temp_path: impl Into<PathBuf>, num_threads: usize) -> Result<Self> {
        info!("Create thread pool with {num_threads} threads for ContentImporter");
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("ContentImporter thread {index}"))
            .build()
            .map(Arc::new)
            .map_err(|_| Error::FailedToStartThreadPool)?;
        Ok(Self {
            tools,
            thread_pool,
            items: Arc::new(ImportingItems::new()),
            watch_control: None,
            running_batches: Arc::new(Mutex::new(0)),
            temp_path: temp_path.into(),
        })
    }

    pub fn from_config(tools: Arc<dyn ContentTools>, config: &ContentConfig) -> Result<Self> {
        Self::new(tools, config.temp_path(), config.import_threads)
    }

    /// Sets the watcher that is suspended while a batch is running.
    pub fn with_watch_control(mut self, watch_control: Arc<dyn WatchControl>) -> Self {
        self.watch_control = Some(watch_control);
        self
    }

    pub fn items(&self) -> &Arc<ImportingItems> {
        &self.items
    }

    /// Imports the files into `destination` and blocks until all of them are done.
    ///
    /// Files are imported in parallel without any ordering between them. A failing file doesn't
    /// abort the other files of the batch. The watcher is suspended until the whole batch is done.
    pub fn import_files(&self, files: &[PathBuf], destination: &Path) -> ImportBatch {
        let proxies = create_proxies(files, destination);
        if proxies.is_empty() {
            info!("No files to import");
            return ImportBatch::default();
        }
        info!("Importing {} files into '{}'", proxies.len(), destination.display());

        let _suspension = WatchSuspension::new(self.watch_control.as_deref(), &self.running_batches);
        let mut batch = ImportBatch::default();

        let outcomes = self.import_proxies(proxies, &mut batch);
        let mut embedded_textures = Vec::new();
        for outcome in outcomes {
            if let Ok(files) = &outcome.result {
                if !files.embedded_textures.is_empty() {
                    embedded_textures.extend(create_proxies(&files.embedded_textures, outcome.proxy.destination()));
                }
            }
            batch.collect(outcome);
        }

        if !embedded_textures.is_empty() {
            info!("Importing {} embedded textures", embedded_textures.len());
            let media_folders = embedded_textures
                .iter()
                .filter_map(|proxy| proxy.file().parent().map(Path::to_path_buf))
                .collect::<BTreeSet<_>>();
            for outcome in self.import_proxies(embedded_textures, &mut batch) {
                batch.collect(outcome);
            }
            for media_folder in media_folders {
                if let Err(err) = fs::remove_dir_all(&media_folder) {
                    warn!("Failed to remove folder '{}': {err}", media_folder.display());
                }
            }
        }

        info!(
            "Import finished: {} files saved, {} files failed",
            batch.saved_files.len(),
            batch.failed_files.len()
        );
        batch
    }

    /// Runs [`ContentImporter::import_files`] on a background thread. The batch is sent to the
    /// returned channel when it's done.
    pub fn spawn_import(&self, files: Vec<PathBuf>, destination: PathBuf) -> Result<Receiver<ImportBatch>> {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let importer = self.clone();
        thread::Builder::new()
            .name("ContentImporter batch".to_owned())
            .spawn(move || {
                let batch = importer.import_files(&files, &destination);
                if sender.send(batch).is_err() {
                    trace!("Receiver of the import batch has been dropped");
                }
            })
            .map_err(|_| Error::FailedToStartThreadPool)?;
        Ok(receiver)
    }

    fn import_proxies(&self, proxies: Vec<AssetProxy>, batch: &mut ImportBatch) -> Vec<ProxyOutcome> {
        let jobs = proxies
            .into_iter()
            .map(|proxy| {
                let item = self.items.add(ImportingItem::new(proxy.file(), proxy.asset_type()));
                batch.items.push(item.clone());
                (proxy, item)
            })
            .collect::<Vec<_>>();

        let outcomes = Mutex::new(Vec::with_capacity(jobs.len()));
        self.thread_pool.scope(|scope| {
            for (proxy, item) in jobs {
                let outcomes = &outcomes;
                scope.spawn(move |_| {
                    trace!("Starting import of '{}'", proxy.file().display());
                    let result = self.import_proxy(&proxy, &item);
                    let status = match &result {
                        Ok(_) => {
                            info!("Imported '{}' in {}", proxy.file().display(), format_duration(item.duration()));
                            ImportStatus::Succeeded
                        }
                        Err(err) => {
                            error!("Failed to import '{}': {err}", proxy.file().display());
                            ImportStatus::Failed
                        }
                    };
                    self.items.set_status(&item, status);
                    outcomes.lock().push(ProxyOutcome { proxy, result });
                });
            }
        });
        outcomes.into_inner()
    }

    fn import_proxy(&self, proxy: &AssetProxy, item: &ImportingItem) -> Result<ImportedFiles> {
        let output_path = proxy.output_path()?;
        match proxy {
            AssetProxy::Geometry { file, settings, .. } => {
                let mut geometry = Geometry::new();
                geometry.import_settings = settings.clone();
                let embedded_textures = geometry.import(file, self.tools.as_ref(), &self.temp_path)?;
                item.set_progress(1.0, 2.0);
                let saved_files = geometry.save(&output_path)?;
                item.set_progress(2.0, 2.0);
                Ok(ImportedFiles {
                    saved_files,
                    embedded_textures,
                })
            }
            AssetProxy::Texture { file, settings, .. } => {
                let mut texture = Texture::new();
                texture.import_settings = settings.clone();
                texture.import(file, self.tools.as_ref())?;
                item.set_progress(1.0, 2.0);
                let saved_files = texture.save(&output_path)?;
                item.set_progress(2.0, 2.0);
                Ok(ImportedFiles {
                    saved_files,
                    ..Default::default()
                })
            }
            AssetProxy::Audio { .. } => Err(Error::NotSupported("audio import")),
        }
    }
}

impl ImportBatch {
    fn collect(&mut self, outcome: ProxyOutcome) {
        match outcome.result {
            Ok(files) => self.saved_files.extend(files.saved_files),
            Err(_) => self.failed_files.push(outcome.proxy.file().to_owned()),
        }
    }
}

/// Suspends the watcher while at least one batch is running.
struct WatchSuspension<'a> {
    watch_control: Option<&'a dyn WatchControl>,
    running_batches: &'a Mutex<usize>,
}

impl<'a> WatchSuspension<'a> {
    fn new(watch_control: Option<&'a dyn WatchControl>, running_batches: &'a Mutex<usize>) -> Self {
        let mut count = running_batches.lock();
        if *count == 0 {
            if let Some(watch_control) = watch_control {
                trace!("Suspending the watcher for the import");
                watch_control.suspend_watching();
            }
        }
        *count += 1;
        Self {
            watch_control,
            running_batches,
        }
    }
}

impl Drop for WatchSuspension<'_> {
    fn drop(&mut self) {
        let mut count = self.running_batches.lock();
        *count -= 1;
        if *count == 0 {
            if let Some(watch_control) = self.watch_control {
                trace!("Resuming the watcher after the import");
                watch_control.resume_watching();
            }
        }
    }
}
