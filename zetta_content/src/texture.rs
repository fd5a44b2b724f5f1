//! Texture assets.
//!
//! The pixel data of a texture is stored as [`Slices`], indexed by array element, mip level and
//! depth. Only volume maps have more than one depth slice per mip level. Their depth halves with
//! every mip level down to a minimum of one while the array size of a volume map is always one.

use std::{
    fmt,
    io::{self, Cursor, Read, Write},
    path::{Path, PathBuf},
};

use image::{codecs::png::PngEncoder, imageops, ColorType, ImageEncoder, RgbaImage};
use zetta_shared::{
    bitflags::bitflags,
    byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
    log::{error, info, warn},
};

use crate::{
    asset_file,
    binary_io::{ReadBinaryExt, WriteBinaryExt},
    compression,
    content_tools::{ContentTools, TextureData, TextureInfo},
    hashing::compute_hash,
    Asset, AssetBase, AssetType, Error, Result,
};

/// Maximum number of mip levels of a texture.
pub const MAX_MIP_LEVELS: u32 = 14;

/// Width of the icons that are generated for textures.
pub const ICON_WIDTH: u32 = 90;

/// Pixel format in the numbering of DXGI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DxgiFormat(pub u32);

impl DxgiFormat {
    pub const UNKNOWN: Self = Self(0);
    pub const R32G32B32A32_FLOAT: Self = Self(2);
    pub const R16G16B16A16_FLOAT: Self = Self(10);
    pub const R8G8B8A8_UNORM: Self = Self(28);
    pub const R8G8B8A8_UNORM_SRGB: Self = Self(29);
    pub const R8_UNORM: Self = Self(61);
    pub const BC1_UNORM: Self = Self(71);
    pub const BC1_UNORM_SRGB: Self = Self(72);
    pub const BC3_UNORM: Self = Self(77);
    pub const BC3_UNORM_SRGB: Self = Self(78);
    pub const BC4_UNORM: Self = Self(80);
    pub const BC5_UNORM: Self = Self(83);
    pub const B8G8R8A8_UNORM: Self = Self(87);
    pub const BC6H_UF16: Self = Self(95);
    pub const BC6H_SF16: Self = Self(96);
    pub const BC7_UNORM: Self = Self(98);
    pub const BC7_UNORM_SRGB: Self = Self(99);

    /// Returns whether the format is one of the BC formats.
    pub fn is_block_compressed(self) -> bool {
        matches!(self.0, 70..=84 | 94..=99)
    }

    /// Name of the format if it's one of the formats the pipeline deals with.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::UNKNOWN => "Unknown",
            Self::R32G32B32A32_FLOAT => "R32G32B32A32 Float",
            Self::R16G16B16A16_FLOAT => "R16G16B16A16 Float",
            Self::R8G8B8A8_UNORM => "R8G8B8A8 UNorm",
            Self::R8G8B8A8_UNORM_SRGB => "R8G8B8A8 UNorm sRGB",
            Self::R8_UNORM => "R8 UNorm",
            Self::BC1_UNORM => "BC1 UNorm",
            Self::BC1_UNORM_SRGB => "BC1 UNorm sRGB",
            Self::BC3_UNORM => "BC3 UNorm",
            Self::BC3_UNORM_SRGB => "BC3 UNorm sRGB",
            Self::BC4_UNORM => "BC4 UNorm",
            Self::BC5_UNORM => "BC5 UNorm",
            Self::B8G8R8A8_UNORM => "B8G8R8A8 UNorm",
            Self::BC6H_UF16 => "BC6H UF16",
            Self::BC6H_SF16 => "BC6H SF16",
            Self::BC7_UNORM => "BC7 UNorm",
            Self::BC7_UNORM_SRGB => "BC7 UNorm sRGB",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for DxgiFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "DXGI format {}", self.0),
        }
    }
}

/// Formats that can be selected as output of a compressed import. The first entry lets the
/// native library pick the format that fits best.
pub const BC_FORMATS: [(DxgiFormat, &str); 7] = [
    (DxgiFormat::UNKNOWN, "Pick best fit"),
    (DxgiFormat::BC1_UNORM, "BC1 (RGBA) Low Quality Alpha"),
    (DxgiFormat::BC3_UNORM, "BC3 (RGBA) Medium Quality"),
    (DxgiFormat::BC4_UNORM, "BC4 (R8) Single-Channel Gray"),
    (DxgiFormat::BC5_UNORM, "BC5 (R8G8) Dual-Channel Gray"),
    (DxgiFormat::BC6H_UF16, "BC6 (UF16) HDR"),
    (DxgiFormat::BC7_UNORM, "BC7 (RGBA) High Quality"),
];

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    Texture1D = 0,
    #[default]
    Texture2D = 1,
    Texture3D = 2,
    TextureCube = 3,
}

impl TextureDimension {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(TextureDimension::Texture1D),
            1 => Some(TextureDimension::Texture2D),
            2 => Some(TextureDimension::Texture3D),
            3 => Some(TextureDimension::TextureCube),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        const IS_HDR = 0x01;
        const HAS_ALPHA = 0x02;
        const IS_PREMULTIPLIED_ALPHA = 0x04;
        const IS_IMPORTED_AS_NORMAL_MAP = 0x08;
        const IS_CUBE_MAP = 0x10;
        const IS_VOLUME_MAP = 0x20;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureImportSettings {
    /// Source images. More than one source is used for arrays, cube maps and volume maps.
    pub sources: Vec<PathBuf>,
    pub dimension: TextureDimension,
    /// Number of mip levels to generate. 0 generates the full chain.
    pub mip_levels: u32,
    /// Alpha values below the threshold are treated as transparent when compressing to BC1.
    pub alpha_threshold: f32,
    pub prefer_bc7: bool,
    /// Index into [`BC_FORMATS`].
    pub format_index: u32,
    pub compress: bool,
}

impl Default for TextureImportSettings {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            dimension: TextureDimension::Texture2D,
            mip_levels: 0,
            alpha_threshold: 0.5,
            prefer_bc7: true,
            format_index: 0,
            compress: false,
        }
    }
}

impl TextureImportSettings {
    /// Format the native library has to produce.
    pub fn output_format(&self) -> DxgiFormat {
        if self.compress {
            let index = (self.format_index as usize).min(BC_FORMATS.len() - 1);
            BC_FORMATS[index].0
        } else {
            DxgiFormat::UNKNOWN
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let sources = self
            .sources
            .iter()
            .map(|source| source.to_string_lossy())
            .collect::<Vec<_>>()
            .join(";");
        writer.write_string(&sources)?;
        writer.write_i32::<LittleEndian>(self.dimension as i32)?;
        writer.write_i32::<LittleEndian>(self.mip_levels.min(MAX_MIP_LEVELS) as i32)?;
        writer.write_f32::<LittleEndian>(self.alpha_threshold.clamp(0.0, 1.0))?;
        writer.write_bool(self.prefer_bc7)?;
        writer.write_i32::<LittleEndian>(self.format_index as i32)?;
        writer.write_bool(self.compress)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let sources = reader.read_string()?;
        let sources = sources.split(';').filter(|source| !source.is_empty()).map(PathBuf::from).collect();
        let dimension = reader.read_i32::<LittleEndian>()?;
        let dimension = TextureDimension::from_i32(dimension)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("invalid texture dimension {dimension}")))?;
        Ok(Self {
            sources,
            dimension,
            mip_levels: (reader.read_len()? as u32).min(MAX_MIP_LEVELS),
            alpha_threshold: reader.read_f32::<LittleEndian>()?.clamp(0.0, 1.0),
            prefer_bc7: reader.read_bool()?,
            format_index: (reader.read_len()? as u32).min(BC_FORMATS.len() as u32 - 1),
            compress: reader.read_bool()?,
        })
    }
}

/// A single image plane of a texture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Slice {
    pub width: u32,
    pub height: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
    pub raw_content: Vec<u8>,
}

/// Slices of a texture indexed by `[array][mip][depth]`.
pub type Slices = Vec<Vec<Vec<Slice>>>;

/// Serializes all slices. Every slice is written as width, height, row pitch and slice pitch
/// (`i32` each) followed by `slice_pitch` bytes of pixel data.
pub fn slices_to_binary(slices: &Slices) -> io::Result<Vec<u8>> {
    let mut writer = Vec::new();
    for slice in slices.iter().flatten().flatten() {
        if slice.raw_content.len() != slice.slice_pitch as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "slice has {} bytes of content but a slice pitch of {}",
                    slice.raw_content.len(),
                    slice.slice_pitch
                ),
            ));
        }
        writer.write_i32::<LittleEndian>(slice.width as i32)?;
        writer.write_i32::<LittleEndian>(slice.height as i32)?;
        writer.write_i32::<LittleEndian>(slice.row_pitch as i32)?;
        writer.write_i32::<LittleEndian>(slice.slice_pitch as i32)?;
        writer.write_all(&slice.raw_content)?;
    }
    Ok(writer)
}

/// Number of depth slices of every mip level.
pub fn depth_per_mip(array_size: u32, mip_levels: u32, is_volume_map: bool) -> Vec<u32> {
    if is_volume_map {
        let mut depth = array_size.max(1);
        (0..mip_levels)
            .map(|_| {
                let current = depth;
                depth = (depth >> 1).max(1);
                current
            })
            .collect()
    } else {
        vec![1; mip_levels as usize]
    }
}

/// Width, height, row pitch and slice pitch of a slice without content.
const MIN_SLICE_RECORD_SIZE: usize = 16;

/// Reverses [`slices_to_binary`]. For volume maps `array_size` is the depth of the first mip level.
pub fn slices_from_binary(data: &[u8], array_size: u32, mip_levels: u32, is_volume_map: bool) -> io::Result<Slices> {
    if mip_levels == 0 || mip_levels > MAX_MIP_LEVELS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid number of mip levels {mip_levels}"),
        ));
    }
    let depth_per_mip = depth_per_mip(array_size, mip_levels, is_volume_map);
    let array_size = if is_volume_map { 1 } else { array_size };

    // The counts come from the file, the smallest slice record bounds what can really follow.
    let max_slices = data.len() / MIN_SLICE_RECORD_SIZE;
    let mut reader = Cursor::new(data);
    let mut slices = Slices::with_capacity((array_size as usize).min(max_slices));
    for _ in 0..array_size {
        let mut mips = Vec::with_capacity(mip_levels as usize);
        for depth in &depth_per_mip {
            let mut depth_slices = Vec::with_capacity((*depth as usize).min(max_slices));
            for _ in 0..*depth {
                let width = reader.read_len()? as u32;
                let height = reader.read_len()? as u32;
                let row_pitch = reader.read_len()? as u32;
                let slice_pitch = reader.read_len()? as u32;
                let raw_content = reader.read_bytes(slice_pitch as usize)?;
                depth_slices.push(Slice {
                    width,
                    height,
                    row_pitch,
                    slice_pitch,
                    raw_content,
                });
            }
            mips.push(depth_slices);
        }
        slices.push(mips);
    }
    Ok(slices)
}

/// Checks the dimensions that are required for block compression and that are recommended in
/// general. Violations are only logged.
pub fn has_valid_dimensions(width: u32, height: u32, file: &Path) -> bool {
    let mut valid = true;
    if width % 4 != 0 || height % 4 != 0 {
        warn!("Texture '{}': dimensions are not a multiple of 4 ({width}x{height})", file.display());
        valid = false;
    }
    if width != height {
        warn!("Texture '{}': texture is not square ({width}x{height})", file.display());
        valid = false;
    }
    if !width.is_power_of_two() || !height.is_power_of_two() {
        warn!("Texture '{}': dimensions are not a power of two ({width}x{height})", file.display());
        valid = false;
    }
    valid
}

/// Creates a PNG thumbnail of [`ICON_WIDTH`] pixels width from a slice with four bytes per pixel.
pub fn create_icon(slice: &Slice) -> Option<Vec<u8>> {
    let row_len = slice.width as usize * 4;
    let required = (slice.height as usize).saturating_sub(1) * slice.row_pitch as usize + row_len;
    if slice.width == 0 || slice.height == 0 || (slice.row_pitch as usize) < row_len || slice.raw_content.len() < required {
        warn!(
            "Can't create an icon from a {}x{} slice with a row pitch of {}",
            slice.width, slice.height, slice.row_pitch
        );
        return None;
    }
    let pixels = (0..slice.height as usize)
        .flat_map(|row| {
            let start = row * slice.row_pitch as usize;
            slice.raw_content[start..start + row_len].iter().copied()
        })
        .collect::<Vec<_>>();
    let image = RgbaImage::from_raw(slice.width, slice.height, pixels)?;
    let icon_height = (slice.height as u64 * ICON_WIDTH as u64 / slice.width as u64).max(1) as u32;
    let icon = imageops::resize(&image, ICON_WIDTH, icon_height, imageops::FilterType::Triangle);

    let mut png = Vec::new();
    if let Err(err) = PngEncoder::new(&mut png).write_image(icon.as_raw(), icon.width(), icon.height(), ColorType::Rgba8) {
        warn!("Failed to encode icon: {err}");
        return None;
    }
    Some(png)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    base: AssetBase,
    pub import_settings: TextureImportSettings,
    width: u32,
    height: u32,
    array_size: u32,
    mip_levels: u32,
    format: DxgiFormat,
    flags: TextureFlags,
    slices: Slices,
}

impl Default for Texture {
    fn default() -> Self {
        Self::new()
    }
}

impl Texture {
    pub fn new() -> Self {
        Self {
            base: AssetBase::new(AssetType::Texture),
            import_settings: TextureImportSettings::default(),
            width: 0,
            height: 0,
            array_size: 0,
            mip_levels: 0,
            format: DxgiFormat::UNKNOWN,
            flags: TextureFlags::empty(),
            slices: Slices::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn array_size(&self) -> u32 {
        self.array_size
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }

    pub fn flags(&self) -> TextureFlags {
        self.flags
    }

    pub fn slices(&self) -> &Slices {
        &self.slices
    }

    pub fn is_cube_map(&self) -> bool {
        self.flags.contains(TextureFlags::IS_CUBE_MAP)
    }

    pub fn is_volume_map(&self) -> bool {
        self.flags.contains(TextureFlags::IS_VOLUME_MAP)
    }

    pub fn is_normal_map(&self) -> bool {
        self.flags.contains(TextureFlags::IS_IMPORTED_AS_NORMAL_MAP)
    }

    /// Sets the number of array elements. Cube maps need a multiple of six.
    pub fn set_array_size(&mut self, array_size: u32) -> Result<()> {
        check_cube_map(self.flags, array_size)?;
        self.array_size = array_size;
        Ok(())
    }

    /// Sets the flags. Marking the texture as a cube map needs an array size that is a multiple of six.
    pub fn set_flags(&mut self, flags: TextureFlags) -> Result<()> {
        check_cube_map(flags, self.array_size)?;
        self.flags = flags;
        Ok(())
    }

    /// Imports the first source of the import settings with the native library.
    pub fn import(&mut self, file: &Path, tools: &dyn ContentTools) -> Result<()> {
        self.import_settings.sources = vec![file.to_owned()];
        let data = tools.import_texture(&self.import_settings).map_err(|err| {
            error!("Texture import error for '{}': {}", file.display(), err.description());
            Error::TextureImport(err)
        })?;

        let slices = slices_from_binary(
            &data.subresource_data,
            data.info.array_size,
            data.info.mip_levels,
            data.info.flags.contains(TextureFlags::IS_VOLUME_MAP),
        )
        .map_err(|err| {
            error!("Failed to read the slices of texture '{}': {err}", file.display());
            Error::invalid_data(file, err)
        })?;
        self.apply_info(&data.info, slices).map_err(|err| {
            error!("Texture '{}' is invalid: {err}", file.display());
            err
        })?;
        has_valid_dimensions(self.width, self.height, file);

        let icon_slice = match &data.icon {
            Some(icon) => slices_from_binary(icon, 1, 1, false)
                .map_err(|err| Error::invalid_data(file, err))?
                .swap_remove(0)
                .swap_remove(0)
                .swap_remove(0),
            None => {
                if self.import_settings.compress {
                    warn!("Native library didn't provide an icon for compressed texture '{}'", file.display());
                }
                self.slices[0][0][0].clone()
            }
        };
        self.base.icon = create_icon(&icon_slice);
        info!(
            "Imported texture '{}': {}x{}, {} array elements, {} mips, {}",
            file.display(),
            self.width,
            self.height,
            self.array_size,
            self.mip_levels,
            self.format
        );
        Ok(())
    }

    /// Decompresses a payload written by [`Asset::save`] and replaces the slices.
    pub fn decompress(&mut self, compressed: &[u8]) -> Result<()> {
        let path = self.debug_path();
        let binary = compression::decompress(compressed).map_err(|err| {
            error!("Failed to decompress texture '{}': {err}", path.display());
            Error::invalid_data(&path, err)
        })?;
        self.slices = slices_from_binary(&binary, self.array_size, self.mip_levels, self.is_volume_map()).map_err(|err| {
            error!("Failed to read the slices of texture '{}': {err}", path.display());
            Error::invalid_data(&path, err)
        })?;
        Ok(())
    }

    /// Returns the slices in an uncompressed format. Block compressed slices are decoded by the native library.
    pub fn decompressed_slices(&self, tools: &dyn ContentTools) -> Result<Slices> {
        if !self.format.is_block_compressed() {
            return Ok(self.slices.clone());
        }
        let data = TextureData {
            info: self.info(),
            subresource_data: slices_to_binary(&self.slices)?,
            icon: None,
        };
        let decompressed = tools.decompress_texture(&data).map_err(|err| {
            error!("Failed to decompress texture '{}': {}", self.debug_path().display(), err.description());
            Error::TextureImport(err)
        })?;
        slices_from_binary(
            &decompressed.subresource_data,
            decompressed.info.array_size,
            decompressed.info.mip_levels,
            decompressed.info.flags.contains(TextureFlags::IS_VOLUME_MAP),
        )
        .map_err(|err| Error::invalid_data(self.debug_path(), err))
    }

    pub fn info(&self) -> TextureInfo {
        TextureInfo {
            width: self.width,
            height: self.height,
            array_size: self.array_size,
            mip_levels: self.mip_levels,
            format: self.format,
            flags: self.flags,
        }
    }

    fn apply_info(&mut self, info: &TextureInfo, slices: Slices) -> Result<()> {
        check_cube_map(info.flags, info.array_size)?;
        if slices.is_empty() || slices[0].is_empty() || slices[0][0].is_empty() {
            return Err(Error::invalid_data(self.debug_path(), "texture has no slices"));
        }
        self.width = info.width;
        self.height = info.height;
        self.array_size = info.array_size;
        self.mip_levels = info.mip_levels;
        self.format = info.format;
        self.flags = info.flags;
        self.slices = slices;
        Ok(())
    }

    fn debug_path(&self) -> PathBuf {
        self.base
            .full_path
            .clone()
            .or_else(|| self.import_settings.sources.first().cloned())
            .unwrap_or_else(|| PathBuf::from("<texture>"))
    }
}

fn check_cube_map(flags: TextureFlags, array_size: u32) -> Result<()> {
    if flags.contains(TextureFlags::IS_CUBE_MAP) && array_size % 6 != 0 {
        return Err(Error::InvalidCubeMapArraySize(array_size));
    }
    Ok(())
}

impl Asset for Texture {
    fn base(&self) -> &AssetBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AssetBase {
        &mut self.base
    }

    fn save(&mut self, path: &Path) -> Result<Vec<PathBuf>> {
        let save = |texture: &mut Texture| -> Result<()> {
            let compressed = compression::compress(&slices_to_binary(&texture.slices)?)?;
            texture.base.resolve_guid(path);
            texture.base.hash = compute_hash(&compressed);

            let mut content = Vec::with_capacity(compressed.len() + 64);
            texture.import_settings.write(&mut content)?;
            content.write_u32::<LittleEndian>(texture.width)?;
            content.write_u32::<LittleEndian>(texture.height)?;
            content.write_u32::<LittleEndian>(texture.array_size)?;
            content.write_u32::<LittleEndian>(texture.flags.bits())?;
            content.write_u32::<LittleEndian>(texture.mip_levels)?;
            content.write_u32::<LittleEndian>(texture.format.0)?;
            content.write_blob(&compressed)?;
            asset_file::write_asset_file(path, &texture.base.header(), &content)?;
            texture.base.full_path = Some(path.to_owned());
            Ok(())
        };
        if let Err(err) = save(self) {
            error!("Failed to save texture to '{}': {err}", path.display());
            return Err(err);
        }
        info!("Saved texture to '{}'", path.display());
        Ok(vec![path.to_owned()])
    }

    fn load(path: &Path) -> Result<Self> {
        let (header, content) = asset_file::read_asset_file(path).map_err(|err| {
            error!("Failed to read texture '{}': {err}", path.display());
            err
        })?;
        let decode = || -> io::Result<(TextureImportSettings, TextureInfo, Vec<u8>)> {
            let mut reader = Cursor::new(&content);
            let import_settings = TextureImportSettings::read(&mut reader)?;
            let width = reader.read_u32::<LittleEndian>()?;
            let height = reader.read_u32::<LittleEndian>()?;
            let array_size = reader.read_u32::<LittleEndian>()?;
            let flags = reader.read_u32::<LittleEndian>()?;
            let flags = TextureFlags::from_bits(flags)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("invalid texture flags {flags:#x}")))?;
            let mip_levels = reader.read_u32::<LittleEndian>()?;
            let format = DxgiFormat(reader.read_u32::<LittleEndian>()?);
            let compressed = reader.read_blob()?;
            let info = TextureInfo {
                width,
                height,
                array_size,
                mip_levels,
                format,
                flags,
            };
            Ok((import_settings, info, compressed))
        };
        let (import_settings, info, compressed) = decode().map_err(|err| {
            error!("Failed to decode texture '{}': {err}", path.display());
            Error::invalid_data(path, err)
        })?;
        if compute_hash(&compressed) != header.hash {
            error!("Hash of texture '{}' doesn't match its payload", path.display());
            return Err(Error::invalid_data(path, "hash doesn't match the payload"));
        }

        let mut texture = Texture::new();
        texture.base.apply_header(header, path)?;
        texture.import_settings = import_settings;
        check_cube_map(info.flags, info.array_size)?;
        texture.width = info.width;
        texture.height = info.height;
        texture.array_size = info.array_size;
        texture.mip_levels = info.mip_levels;
        texture.format = info.format;
        texture.flags = info.flags;
        texture.decompress(&compressed)?;
        Ok(texture)
    }

    fn pack_for_engine(&self) -> Result<Vec<u8>> {
        error!("Packing textures for the engine is not supported yet");
        Err(Error::NotSupported("packing textures for the engine"))
    }
}
