use std::{
    fmt,
    path::{Path, PathBuf},
    time::SystemTime,
};

use zetta_shared::{
    log::{error, trace},
    uuid::Uuid,
};

use crate::{
    asset_file::{self, AssetHeader},
    geometry::Geometry,
    texture::Texture,
    Error, Result,
};

/// Kind of content stored in an asset file.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetType {
    Unknown = 0,
    Animation = 1,
    Audio = 2,
    Material = 3,
    Mesh = 4,
    Skeleton = 5,
    Texture = 6,
}

impl AssetType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(AssetType::Unknown),
            1 => Some(AssetType::Animation),
            2 => Some(AssetType::Audio),
            3 => Some(AssetType::Material),
            4 => Some(AssetType::Mesh),
            5 => Some(AssetType::Skeleton),
            6 => Some(AssetType::Texture),
            _ => None,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Bookkeeping that every asset carries regardless of its type.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetBase {
    pub guid: Uuid,
    pub asset_type: AssetType,
    /// Digest of the payload that was written last or read last.
    pub hash: Vec<u8>,
    /// Location the asset was saved to or loaded from last.
    pub full_path: Option<PathBuf>,
    /// PNG encoded thumbnail.
    pub icon: Option<Vec<u8>>,
}

impl AssetBase {
    pub fn new(asset_type: AssetType) -> Self {
        Self {
            guid: Uuid::new_v4(),
            asset_type,
            hash: Vec::new(),
            full_path: None,
            icon: None,
        }
    }

    /// Determines the GUID for saving to `path`. An asset of the same type that already exists at
    /// `path` keeps its GUID. In every other case a fresh GUID is generated.
    pub(crate) fn resolve_guid(&mut self, path: &Path) {
        self.guid = match asset_file::read_asset_header(path) {
            Ok(header) if header.asset_type == self.asset_type => {
                trace!("Reusing guid {} of '{}'", header.guid, path.display());
                header.guid
            }
            _ => Uuid::new_v4(),
        };
    }

    pub(crate) fn header(&self) -> AssetHeader {
        AssetHeader::new(self.guid, self.asset_type, self.hash.clone(), self.icon.clone().unwrap_or_default())
    }

    /// Takes over the identity from a header that has been read from `path`.
    pub(crate) fn apply_header(&mut self, header: AssetHeader, path: &Path) -> Result<()> {
        if header.asset_type != self.asset_type {
            return Err(Error::invalid_data(
                path,
                format!("expected a {} asset but found a {} asset", self.asset_type, header.asset_type),
            ));
        }
        self.guid = header.guid;
        self.hash = header.hash;
        self.icon = (!header.icon.is_empty()).then_some(header.icon);
        self.full_path = Some(path.to_owned());
        Ok(())
    }
}

/// Common contract of everything that can be written to an asset file.
pub trait Asset {
    fn base(&self) -> &AssetBase;

    fn base_mut(&mut self) -> &mut AssetBase;

    /// Writes the asset to `path` and returns all files that have been written.
    fn save(&mut self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Reads an asset from `path`.
    fn load(path: &Path) -> Result<Self>
    where
        Self: Sized;

    /// Serializes the asset into the layout that the engine consumes at runtime.
    fn pack_for_engine(&self) -> Result<Vec<u8>>;

    fn guid(&self) -> Uuid {
        self.base().guid
    }

    fn asset_type(&self) -> AssetType {
        self.base().asset_type
    }

    fn hash(&self) -> &[u8] {
        &self.base().hash
    }

    fn full_path(&self) -> Option<&Path> {
        self.base().full_path.as_deref()
    }

    fn icon(&self) -> Option<&[u8]> {
        self.base().icon.as_deref()
    }
}

/// An asset of any supported type that has been read from disk.
#[derive(Debug)]
pub enum LoadedAsset {
    Geometry(Geometry),
    Texture(Texture),
}

/// Reads an asset file and decodes it with the codec that matches the type in its header.
pub fn load_asset(path: &Path) -> Result<LoadedAsset> {
    let header = asset_file::read_asset_header(path)?;
    match header.asset_type {
        AssetType::Mesh => Ok(LoadedAsset::Geometry(Geometry::load(path)?)),
        AssetType::Texture => Ok(LoadedAsset::Texture(Texture::load(path)?)),
        asset_type => {
            error!("Assets of type {asset_type} can't be loaded: '{}'", path.display());
            Err(Error::NotSupported("loading assets of this type"))
        }
    }
}

/// Lightweight description of an asset file as tracked by the [`AssetRegistry`](crate::AssetRegistry).
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInfo {
    pub guid: Uuid,
    pub asset_type: AssetType,
    pub full_path: PathBuf,
    /// Time at which the file has been registered.
    pub register_time: SystemTime,
    /// Size of the asset file in bytes.
    pub size: u64,
    pub hash: Vec<u8>,
    pub icon: Option<Vec<u8>>,
}

impl AssetInfo {
    /// Returns the file name of the asset without the extension.
    pub fn name(&self) -> String {
        self.full_path
            .file_stem()
            .map(|file_stem| file_stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Reads the [`AssetInfo`] of an asset file. Only the header is decoded.
pub fn read_asset_info(path: &Path) -> Result<AssetInfo> {
    let header = asset_file::read_asset_header(path)?;
    let size = path.metadata()?.len();
    Ok(AssetInfo {
        guid: header.guid,
        asset_type: header.asset_type,
        full_path: path.to_owned(),
        register_time: SystemTime::now(),
        size,
        hash: header.hash,
        icon: (!header.icon.is_empty()).then_some(header.icon),
    })
}
