//! Interface to the native processing service.
//!
//! Decoding FBX scenes, generating primitive meshes and encoding textures is done by a native
//! library. The pipeline only depends on the [`ContentTools`] trait. Implementations are
//! expected to be re-entrant; every call blocks until the native side returns.

use std::{fmt, path::Path, result};

use crate::{
    geometry::GeometryImportSettings,
    texture::{DxgiFormat, TextureFlags, TextureImportSettings},
    Result,
};

/// Error codes reported by the native texture import.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureImportError {
    Succeeded = 0,
    Unknown = 1,
    Compress = 2,
    Decompress = 3,
    Load = 4,
    MipmapGeneration = 5,
    MaxSizeExceeded = 6,
    SizeMismatch = 7,
    FormatMismatch = 8,
    FileNotFound = 9,
    NeedSixImages = 10,
}

impl TextureImportError {
    /// Maps a raw code of the native library. Unknown codes map to [`TextureImportError::Unknown`].
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => TextureImportError::Succeeded,
            2 => TextureImportError::Compress,
            3 => TextureImportError::Decompress,
            4 => TextureImportError::Load,
            5 => TextureImportError::MipmapGeneration,
            6 => TextureImportError::MaxSizeExceeded,
            7 => TextureImportError::SizeMismatch,
            8 => TextureImportError::FormatMismatch,
            9 => TextureImportError::FileNotFound,
            10 => TextureImportError::NeedSixImages,
            _ => TextureImportError::Unknown,
        }
    }

    /// Message that is shown to the user.
    pub fn description(&self) -> &'static str {
        match self {
            TextureImportError::Succeeded => "Import succeeded",
            TextureImportError::Unknown => "Unknown error",
            TextureImportError::Compress => "Texture compression failed",
            TextureImportError::Decompress => "Texture decompression failed",
            TextureImportError::Load => "Failed to load texture into memory",
            TextureImportError::MipmapGeneration => "Texture mipmap generation failed",
            TextureImportError::MaxSizeExceeded => "Maximum subresource size of 4GB exceeded",
            TextureImportError::SizeMismatch => "Source images do not have the same dimensions",
            TextureImportError::FormatMismatch => "Source images do not have the same format",
            TextureImportError::FileNotFound => "Source image file not found",
            TextureImportError::NeedSixImages => "Cube maps can only be made with a multiple of 6 images",
        }
    }
}

impl fmt::Display for TextureImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), *self as i32)
    }
}

/// Metadata of a texture as reported by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub array_size: u32,
    pub mip_levels: u32,
    pub format: DxgiFormat,
    pub flags: TextureFlags,
}

/// Texture as it is exchanged with the native library.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub info: TextureInfo,
    /// All slices in the layout of [`slices_to_binary`](crate::texture::slices_to_binary).
    pub subresource_data: Vec<u8>,
    /// A single slice in the layout of [`slices_to_binary`](crate::texture::slices_to_binary)
    /// that can be used as the source of the icon.
    pub icon: Option<Vec<u8>>,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMeshType {
    Plane = 0,
    Cube = 1,
    UvSphere = 2,
    IcoSphere = 3,
    Cylinder = 4,
    Capsule = 5,
}

/// Parameters of a generated primitive mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveInitInfo {
    pub mesh_type: PrimitiveMeshType,
    pub segments: [u32; 3],
    pub size: [f32; 3],
    pub lod: u32,
}

impl PrimitiveInitInfo {
    pub fn new(mesh_type: PrimitiveMeshType) -> Self {
        Self {
            mesh_type,
            segments: [1, 1, 1],
            size: [1.0, 1.0, 1.0],
            lod: 0,
        }
    }
}

/// Native processing service.
///
/// The geometry functions return the raw scene layout that is parsed by
/// [`Geometry::from_raw_data`](crate::geometry::Geometry::from_raw_data).
pub trait ContentTools: Send + Sync {
    /// Decodes the FBX file at `file`.
    fn import_fbx(&self, file: &Path, settings: &GeometryImportSettings) -> Result<Vec<u8>>;

    /// Generates a primitive mesh.
    fn create_primitive_mesh(&self, info: &PrimitiveInitInfo, settings: &GeometryImportSettings) -> Result<Vec<u8>>;

    /// Decodes and optionally compresses the sources that are named in the settings.
    fn import_texture(&self, settings: &TextureImportSettings) -> result::Result<TextureData, TextureImportError>;

    /// Decodes block compressed texture data into an uncompressed format.
    fn decompress_texture(&self, texture: &TextureData) -> result::Result<TextureData, TextureImportError>;
}
