//! Geometry assets: LOD groups of meshes with raw vertex and index buffers.
//!
//! A [`Geometry`] owns [`LodGroup`]s. Every group contains [`MeshLod`]s ordered from the most to
//! the least detailed level and every level contains the [`Mesh`]es that are rendered at that
//! level. Three encodings exist:
//!
//! * the raw scene layout produced by the native [`ContentTools`], read by [`Geometry::from_raw_data`],
//! * the asset file payload written by [`Asset::save`] (one file per LOD group),
//! * the engine layout written by [`Asset::pack_for_engine`].

use std::{
    collections::HashMap,
    fs,
    io::{self, Cursor, Read, Write},
    path::{Path, PathBuf},
    result,
};

use zetta_shared::{
    bitflags::bitflags,
    byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
    log::{error, info, trace, warn},
};

use crate::{
    asset_file,
    binary_io::{ReadBinaryExt, WriteBinaryExt},
    common::{extract_extension_from_path, extract_file_stem_from_path},
    content_tools::{ContentTools, PrimitiveInitInfo},
    hashing::compute_hash,
    random_string, sanitize_file_name, Asset, AssetBase, AssetType, Error, Result, ASSET_FILE_EXTENSION,
};

bitflags! {
    /// Optional vertex attributes that are stored in the elements buffer of a [`Mesh`]. The
    /// position is always present and stored in its own buffer, so an empty set means that a
    /// mesh has positions only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ElementsType: u32 {
        const NORMALS = 0x01;
        /// Tangent space. Always includes the normals.
        const TSPACE = 0x03;
        const JOINTS = 0x04;
        const COLORS = 0x08;
    }
}

impl ElementsType {
    /// Size in bytes of one vertex in the elements buffer.
    ///
    /// The fields follow the declaration order of the flags:
    ///
    /// | Flag    | Fields                                           | Size |
    /// |---------|--------------------------------------------------|------|
    /// | NORMALS | tangent sign u8, reserved u8[3], normal u16[2]   | 8    |
    /// | TSPACE  | tangent u16[2], uv f32[2]                        | 12   |
    /// | JOINTS  | joint weights u8[3], reserved u8, joints u16[4]  | 12   |
    /// | COLORS  | color u8[3], reserved u8                         | 4    |
    pub fn stride(self) -> u32 {
        let mut stride = 0;
        if self.contains(ElementsType::NORMALS) {
            stride += 8;
        }
        if self.contains(ElementsType::TSPACE) {
            stride += 12;
        }
        if self.contains(ElementsType::JOINTS) {
            stride += 12;
        }
        if self.contains(ElementsType::COLORS) {
            stride += 4;
        }
        stride
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList = 1,
    LineList = 2,
    LineStrip = 3,
    TriangleList = 4,
    TriangleStrip = 5,
}

impl PrimitiveTopology {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(PrimitiveTopology::PointList),
            2 => Some(PrimitiveTopology::LineList),
            3 => Some(PrimitiveTopology::LineStrip),
            4 => Some(PrimitiveTopology::TriangleList),
            5 => Some(PrimitiveTopology::TriangleStrip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    /// Size of one vertex in the elements buffer.
    pub element_size: u32,
    pub elements_type: ElementsType,
    pub topology: PrimitiveTopology,
    pub vertex_count: u32,
    /// Size of one index in bytes.
    pub index_size: u32,
    pub index_count: u32,
    /// `vertex_count` positions of three `f32`.
    pub positions: Vec<u8>,
    pub elements: Vec<u8>,
    pub indices: Vec<u8>,
}

impl Mesh {
    /// Size of one position in bytes.
    pub const POSITION_SIZE: u32 = 12;

    /// Checks that the buffers have exactly the sizes that the counts declare.
    pub fn check_buffers(&self) -> result::Result<(), String> {
        let check = |buffer: &str, actual: usize, count: u32, size: u32| {
            let expected = count as u64 * size as u64;
            if actual as u64 != expected {
                Err(format!(
                    "{buffer} buffer of mesh '{}' has {actual} bytes but {expected} are expected",
                    self.name
                ))
            } else {
                Ok(())
            }
        };
        check("position", self.positions.len(), self.vertex_count, Self::POSITION_SIZE)?;
        check("elements", self.elements.len(), self.vertex_count, self.element_size)?;
        check("index", self.indices.len(), self.index_count, self.index_size)?;
        Ok(())
    }

    fn read_buffers<R: Read>(&mut self, mut reader: R) -> io::Result<()> {
        let len = |count: u32, size: u32| {
            usize::try_from(count as u64 * size as u64).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "buffer too large"))
        };
        self.positions = reader.read_bytes(len(self.vertex_count, Self::POSITION_SIZE)?)?;
        self.elements = reader.read_bytes(len(self.vertex_count, self.element_size)?)?;
        self.indices = reader.read_bytes(len(self.index_count, self.index_size)?)?;
        Ok(())
    }

    fn warn_on_layout_mismatch(&self) {
        let stride = self.elements_type.stride();
        if stride != self.element_size {
            warn!(
                "Mesh '{}' declares an element size of {} bytes but its elements {:?} take {stride} bytes",
                self.name, self.element_size, self.elements_type
            );
        }
    }
}

/// Meshes that are rendered together at one level of detail.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshLod {
    pub name: String,
    /// The level is used up to this threshold.
    pub lod_threshold: f32,
    pub meshes: Vec<Mesh>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LodGroup {
    pub name: String,
    pub lods: Vec<MeshLod>,
}

/// Settings that are passed to the native library when importing a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryImportSettings {
    pub calculate_normals: bool,
    pub calculate_tangents: bool,
    /// Angle in degrees (0 to 180) up to which faces are smoothed when calculating normals.
    pub smoothing_angle: f32,
    pub reverse_handedness: bool,
    pub import_embedded_textures: bool,
    pub import_animations: bool,
}

impl Default for GeometryImportSettings {
    fn default() -> Self {
        Self {
            calculate_normals: false,
            calculate_tangents: false,
            smoothing_angle: 178.0,
            reverse_handedness: false,
            import_embedded_textures: true,
            import_animations: true,
        }
    }
}

impl GeometryImportSettings {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_bool(self.calculate_normals)?;
        writer.write_bool(self.calculate_tangents)?;
        writer.write_f32::<LittleEndian>(self.smoothing_angle)?;
        writer.write_bool(self.reverse_handedness)?;
        writer.write_bool(self.import_embedded_textures)?;
        writer.write_bool(self.import_animations)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            calculate_normals: reader.read_bool()?,
            calculate_tangents: reader.read_bool()?,
            smoothing_angle: reader.read_f32::<LittleEndian>()?.clamp(0.0, 180.0),
            reverse_handedness: reader.read_bool()?,
            import_embedded_textures: reader.read_bool()?,
            import_animations: reader.read_bool()?,
        })
    }
}

/// Name used for the raw data in error messages since it doesn't come from a file.
const RAW_DATA: &str = "<raw geometry>";

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    base: AssetBase,
    pub import_settings: GeometryImportSettings,
    pub lod_groups: Vec<LodGroup>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_media_folder(media_path: &Path) {
    if !media_path.is_dir() {
        return;
    }
    if let Err(err) = fs::remove_dir_all(media_path) {
        warn!("Failed to remove media folder '{}': {err}", media_path.display());
    }
}

impl Geometry {
    pub fn new() -> Self {
        Self {
            base: AssetBase::new(AssetType::Mesh),
            import_settings: GeometryImportSettings::default(),
            lod_groups: Vec::new(),
        }
    }

    /// Generates a primitive mesh with the native library.
    pub fn create_primitive(tools: &dyn ContentTools, info: &PrimitiveInitInfo) -> Result<Self> {
        let mut geometry = Geometry::new();
        let data = tools.create_primitive_mesh(info, &geometry.import_settings).map_err(|err| {
            error!("Failed to create primitive mesh {:?}: {err}", info.mesh_type);
            err
        })?;
        geometry.from_raw_data(&data)?;
        Ok(geometry)
    }

    /// Imports the scene at `file` with the native library.
    ///
    /// The file is copied into `temp_path` under a random name first and only the copy is
    /// processed. Returns the textures that the native library extracted from the scene when
    /// importing embedded textures is enabled.
    pub fn import(&mut self, file: &Path, tools: &dyn ContentTools, temp_path: &Path) -> Result<Vec<PathBuf>> {
        if !file.exists() {
            error!("Geometry source file doesn't exist: '{}'", file.display());
            return Err(Error::FileNotFound(file.to_owned()));
        }
        let extension = extract_extension_from_path(file)?;
        fs::create_dir_all(temp_path)?;
        let scratch_name = random_string(8);
        let scratch_file = temp_path.join(format!("{scratch_name}.{extension}"));
        trace!("Copying '{}' to scratch file '{}'", file.display(), scratch_file.display());
        fs::copy(file, &scratch_file)?;

        // The native library extracts embedded textures into a media folder next to the scene.
        let media_path = temp_path.join(format!("{scratch_name}.fbm"));
        let result = tools
            .import_fbx(&scratch_file, &self.import_settings)
            .and_then(|data| self.from_raw_data(&data));
        if let Err(err) = fs::remove_file(&scratch_file) {
            warn!("Failed to remove scratch file '{}': {err}", scratch_file.display());
        }
        if let Err(err) = result {
            error!("Failed to import geometry '{}': {err}", file.display());
            remove_media_folder(&media_path);
            return Err(err);
        }

        if !media_path.is_dir() {
            return Ok(Vec::new());
        }
        if !self.import_settings.import_embedded_textures {
            remove_media_folder(&media_path);
            return Ok(Vec::new());
        }
        let mut embedded = fs::read_dir(&media_path)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        embedded.sort();
        info!("Found {} embedded textures in '{}'", embedded.len(), file.display());
        Ok(embedded)
    }

    /// Parses the raw scene layout of the native library and replaces the LOD groups.
    ///
    /// Meshes that share a LOD id are collected in a single [`MeshLod`] whose name and
    /// threshold are taken from the first mesh with that id. A LOD id of -1 always starts a new
    /// [`MeshLod`].
    pub fn from_raw_data(&mut self, data: &[u8]) -> Result<()> {
        let lod_groups = read_raw_scene(&mut Cursor::new(data)).map_err(|err| {
            error!("Failed to parse raw geometry data: {err}");
            Error::invalid_data(RAW_DATA, err)
        })?;
        for mesh in lod_groups.iter().flat_map(|group| &group.lods).flat_map(|lod| &lod.meshes) {
            mesh.warn_on_layout_mismatch();
        }
        self.lod_groups = lod_groups;
        Ok(())
    }

    /// Returns the LOD group at `index`.
    pub fn lod_group(&self, index: usize) -> Option<&LodGroup> {
        self.lod_groups.get(index)
    }

    /// Packs the LOD group at `index` into the engine layout.
    ///
    /// | Field             | Type | Description                                   |
    /// |-------------------|------|-----------------------------------------------|
    /// | LOD count         | u32  |                                               |
    /// | per LOD           |      |                                               |
    /// | - threshold       | f32  |                                               |
    /// | - mesh count      | u32  |                                               |
    /// | - submeshes size  | u32  | Size of all following meshes of this LOD      |
    /// | - per mesh        |      |                                               |
    /// | -- element size   | u32  |                                               |
    /// | -- vertex count   | u32  |                                               |
    /// | -- index count    | u32  | Index size is implied by the vertex count     |
    /// | -- elements type  | u32  |                                               |
    /// | -- topology       | u32  |                                               |
    /// | -- positions      | u8[] | Padded to 4 bytes                             |
    /// | -- elements       | u8[] | Padded to 4 bytes                             |
    /// | -- indices        | u8[] |                                               |
    pub fn pack_lod_group_for_engine(&self, index: usize) -> Result<Vec<u8>> {
        let Some(lod_group) = self.lod_groups.get(index) else {
            error!("Geometry has no LOD group with index {index}");
            return Err(Error::invalid_data(self.debug_path(), format!("no LOD group with index {index}")));
        };
        pack_lod_group(lod_group).map_err(Error::from)
    }

    fn debug_path(&self) -> PathBuf {
        self.base.full_path.clone().unwrap_or_else(|| PathBuf::from(RAW_DATA))
    }
}

impl Asset for Geometry {
    fn base(&self) -> &AssetBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AssetBase {
        &mut self.base
    }

    /// Writes one asset file per LOD group. With more than one group the name of the first LOD
    /// of a group is appended to the file name.
    fn save(&mut self, path: &Path) -> Result<Vec<PathBuf>> {
        let file_stem = extract_file_stem_from_path(path)?;
        let extension = extract_extension_from_path(path).unwrap_or_else(|_| ASSET_FILE_EXTENSION.to_owned());
        let directory = path.parent().map(Path::to_owned).unwrap_or_default();
        if self.lod_groups.is_empty() {
            warn!("Geometry '{}' has no LOD groups, nothing is saved", path.display());
        }

        let mut saved_files = Vec::new();
        let multiple_groups = self.lod_groups.len() > 1;
        for lod_group in &self.lod_groups {
            let file_name = if multiple_groups {
                let lod_name = lod_group.lods.first().map(|lod| lod.name.as_str()).unwrap_or(&lod_group.name);
                format!("{file_stem}_{lod_name}.{extension}")
            } else {
                format!("{file_stem}.{extension}")
            };
            let file_path = sanitize_file_name(&directory.join(file_name));

            let save = |base: &mut AssetBase| -> Result<()> {
                let payload = write_lod_group(lod_group)?;
                base.resolve_guid(&file_path);
                base.hash = compute_hash(&payload);

                let mut content = Vec::with_capacity(payload.len() + 16);
                self.import_settings.write(&mut content)?;
                content.write_u32::<LittleEndian>(payload.len() as u32)?;
                content.write_all(&payload)?;
                asset_file::write_asset_file(&file_path, &base.header(), &content)?;
                base.full_path = Some(file_path.clone());
                Ok(())
            };
            if let Err(err) = save(&mut self.base) {
                error!("Failed to save geometry to '{}': {err}", file_path.display());
                return Err(err);
            }
            info!("Saved geometry '{}' to '{}'", lod_group.name, file_path.display());
            saved_files.push(file_path);
        }
        Ok(saved_files)
    }

    /// Reads a file written by [`Asset::save`]. The result has exactly one LOD group.
    fn load(path: &Path) -> Result<Self> {
        let (header, content) = asset_file::read_asset_file(path).map_err(|err| {
            error!("Failed to read geometry '{}': {err}", path.display());
            err
        })?;
        let decode = || -> io::Result<(GeometryImportSettings, Vec<u8>, LodGroup)> {
            let mut reader = Cursor::new(&content);
            let import_settings = GeometryImportSettings::read(&mut reader)?;
            let payload_len = reader.read_u32::<LittleEndian>()?;
            let payload = reader.read_bytes(payload_len as usize)?;
            let lod_group = read_lod_group(&mut Cursor::new(&payload))?;
            Ok((import_settings, payload, lod_group))
        };
        let (import_settings, payload, lod_group) = decode().map_err(|err| {
            error!("Failed to decode geometry '{}': {err}", path.display());
            Error::invalid_data(path, err)
        })?;
        if compute_hash(&payload) != header.hash {
            error!("Hash of geometry '{}' doesn't match its payload", path.display());
            return Err(Error::invalid_data(path, "hash doesn't match the payload"));
        }

        let mut geometry = Geometry::new();
        geometry.base.apply_header(header, path)?;
        geometry.import_settings = import_settings;
        geometry.lod_groups = vec![lod_group];
        Ok(geometry)
    }

    /// Packs the first LOD group. The other groups are left out, use
    /// [`Geometry::pack_lod_group_for_engine`] to pack them.
    fn pack_for_engine(&self) -> Result<Vec<u8>> {
        if self.lod_groups.len() > 1 {
            let skipped = self.lod_groups[1..].iter().map(|group| group.name.as_str()).collect::<Vec<_>>();
            warn!("Only the first LOD group is packed for the engine. Skipped groups: {skipped:?}");
        }
        self.pack_lod_group_for_engine(0)
    }
}

fn read_raw_scene<R: Read>(reader: &mut R) -> io::Result<Vec<LodGroup>> {
    let _scene_name = reader.read_string()?;
    let lod_group_count = reader.read_len()?;
    let mut lod_groups = Vec::new();
    for _ in 0..lod_group_count {
        let mut name = reader.read_string()?;
        if name.is_empty() {
            name = format!("lod_{}", random_string(8));
        }
        let mesh_count = reader.read_len()?;
        let mut lods: Vec<MeshLod> = Vec::new();
        let mut lod_indices = HashMap::<i32, usize>::new();
        for _ in 0..mesh_count {
            let (lod_id, lod_threshold, mesh) = read_raw_mesh(reader)?;
            match lod_indices.get(&lod_id) {
                Some(&lod_index) if lod_id != -1 => lods[lod_index].meshes.push(mesh),
                _ => {
                    lod_indices.insert(lod_id, lods.len());
                    lods.push(MeshLod {
                        name: mesh.name.clone(),
                        lod_threshold,
                        meshes: vec![mesh],
                    });
                }
            }
        }
        lod_groups.push(LodGroup { name, lods });
    }
    Ok(lod_groups)
}

fn read_raw_mesh<R: Read>(reader: &mut R) -> io::Result<(i32, f32, Mesh)> {
    let mut name = reader.read_string()?;
    if name.is_empty() {
        name = format!("mesh_{}", random_string(8));
    }
    let lod_id = reader.read_i32::<LittleEndian>()?;
    let element_size = reader.read_len()? as u32;
    let elements_type = read_elements_type(reader)?;
    let vertex_count = reader.read_len()? as u32;
    let index_size = reader.read_len()? as u32;
    let index_count = reader.read_len()? as u32;
    let lod_threshold = reader.read_f32::<LittleEndian>()?;
    let mut mesh = Mesh {
        name,
        element_size,
        elements_type,
        topology: PrimitiveTopology::TriangleList,
        vertex_count,
        index_size,
        index_count,
        positions: Vec::new(),
        elements: Vec::new(),
        indices: Vec::new(),
    };
    mesh.read_buffers(reader)?;
    Ok((lod_id, lod_threshold, mesh))
}

fn read_elements_type<R: Read>(reader: &mut R) -> io::Result<ElementsType> {
    let value = reader.read_u32::<LittleEndian>()?;
    ElementsType::from_bits(value).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("invalid elements type {value:#x}")))
}

fn write_lod_group(lod_group: &LodGroup) -> io::Result<Vec<u8>> {
    let mut writer = Vec::new();
    writer.write_string(&lod_group.name)?;
    writer.write_u32::<LittleEndian>(lod_group.lods.len() as u32)?;
    for lod in &lod_group.lods {
        writer.write_string(&lod.name)?;
        writer.write_f32::<LittleEndian>(lod.lod_threshold)?;
        writer.write_u32::<LittleEndian>(lod.meshes.len() as u32)?;
        for mesh in &lod.meshes {
            mesh.check_buffers().map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
            writer.write_string(&mesh.name)?;
            writer.write_u32::<LittleEndian>(mesh.element_size)?;
            writer.write_u32::<LittleEndian>(mesh.elements_type.bits())?;
            writer.write_u32::<LittleEndian>(mesh.topology as u32)?;
            writer.write_u32::<LittleEndian>(mesh.vertex_count)?;
            writer.write_u32::<LittleEndian>(mesh.index_size)?;
            writer.write_u32::<LittleEndian>(mesh.index_count)?;
            writer.write_all(&mesh.positions)?;
            writer.write_all(&mesh.elements)?;
            writer.write_all(&mesh.indices)?;
        }
    }
    Ok(writer)
}

fn read_lod_group<R: Read>(reader: &mut R) -> io::Result<LodGroup> {
    let name = reader.read_string()?;
    let lod_count = reader.read_u32::<LittleEndian>()?;
    let mut lods = Vec::new();
    for _ in 0..lod_count {
        let lod_name = reader.read_string()?;
        let lod_threshold = reader.read_f32::<LittleEndian>()?;
        let mesh_count = reader.read_u32::<LittleEndian>()?;
        let mut meshes = Vec::new();
        for _ in 0..mesh_count {
            let name = reader.read_string()?;
            let element_size = reader.read_u32::<LittleEndian>()?;
            let elements_type = read_elements_type(reader)?;
            let topology = reader.read_u32::<LittleEndian>()?;
            let topology = PrimitiveTopology::from_u32(topology)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("invalid topology {topology}")))?;
            let mut mesh = Mesh {
                name,
                element_size,
                elements_type,
                topology,
                vertex_count: reader.read_u32::<LittleEndian>()?,
                index_size: reader.read_u32::<LittleEndian>()?,
                index_count: reader.read_u32::<LittleEndian>()?,
                positions: Vec::new(),
                elements: Vec::new(),
                indices: Vec::new(),
            };
            mesh.read_buffers(&mut *reader)?;
            meshes.push(mesh);
        }
        lods.push(MeshLod {
            name: lod_name,
            lod_threshold,
            meshes,
        });
    }
    Ok(LodGroup { name, lods })
}

fn write_padded<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    writer.write_all(data)?;
    let padding = (4 - data.len() % 4) % 4;
    writer.write_all(&[0u8; 3][..padding])
}

fn pack_lod_group(lod_group: &LodGroup) -> io::Result<Vec<u8>> {
    let mut writer = Vec::new();
    writer.write_u32::<LittleEndian>(lod_group.lods.len() as u32)?;
    for lod in &lod_group.lods {
        writer.write_f32::<LittleEndian>(lod.lod_threshold)?;
        writer.write_u32::<LittleEndian>(lod.meshes.len() as u32)?;

        let mut submeshes = Vec::new();
        for mesh in &lod.meshes {
            submeshes.write_u32::<LittleEndian>(mesh.element_size)?;
            submeshes.write_u32::<LittleEndian>(mesh.vertex_count)?;
            submeshes.write_u32::<LittleEndian>(mesh.index_count)?;
            submeshes.write_u32::<LittleEndian>(mesh.elements_type.bits())?;
            submeshes.write_u32::<LittleEndian>(mesh.topology as u32)?;
            write_padded(&mut submeshes, &mesh.positions)?;
            write_padded(&mut submeshes, &mesh.elements)?;
            submeshes.write_all(&mesh.indices)?;
        }
        writer.write_u32::<LittleEndian>(submeshes.len() as u32)?;
        writer.write_all(&submeshes)?;
    }
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;
    use zetta_test::setup_logger;

    use super::*;
    use crate::{
        content_tools::PrimitiveMeshType,
        test_utils::{raw_geometry, test_mesh, FakeContentTools, RawMesh},
    };

    fn geometry_with_groups(groups: usize) -> Geometry {
        let mut geometry = Geometry::new();
        geometry.lod_groups = (0..groups)
            .map(|group| LodGroup {
                name: format!("group{group}"),
                lods: vec![
                    MeshLod {
                        name: format!("high{group}"),
                        lod_threshold: 10.0 + group as f32,
                        meshes: vec![test_mesh("body", ElementsType::NORMALS, 4), test_mesh("head", ElementsType::TSPACE, 3)],
                    },
                    MeshLod {
                        name: format!("low{group}"),
                        lod_threshold: 2.5,
                        meshes: vec![test_mesh("body_low", ElementsType::empty(), 3)],
                    },
                ],
            })
            .collect();
        geometry
    }

    #[test]
    fn element_strides() {
        assert_eq!(ElementsType::empty().stride(), 0);
        assert_eq!(ElementsType::NORMALS.stride(), 8);
        assert_eq!(ElementsType::TSPACE.stride(), 20);
        assert_eq!((ElementsType::TSPACE | ElementsType::JOINTS | ElementsType::COLORS).stride(), 36);
        assert!(ElementsType::TSPACE.contains(ElementsType::NORMALS));
    }

    #[test]
    fn lod_coalescing() {
        setup_logger();

        // Given
        let data = raw_geometry(&[(
            "group",
            vec![
                RawMesh::new("a", 0, 5.0),
                RawMesh::new("b", 1, 3.0),
                RawMesh::new("c", 0, 5.0),
                RawMesh::new("d", 2, 1.0),
            ],
        )]);

        // When
        let mut geometry = Geometry::new();
        geometry.from_raw_data(&data).unwrap();

        // Then
        let lods = &geometry.lod_groups[0].lods;
        assert_eq!(lods.len(), 3);
        assert_eq!(lods[0].name, "a");
        assert_eq!(lods[0].lod_threshold, 5.0);
        assert_eq!(lods[0].meshes.iter().map(|mesh| mesh.name.as_str()).collect::<Vec<_>>(), ["a", "c"]);
        assert_eq!(lods[1].lod_threshold, 3.0);
        assert_eq!(lods[2].lod_threshold, 1.0);
        assert!(lods.iter().flat_map(|lod| &lod.meshes).all(|mesh| mesh.topology == PrimitiveTopology::TriangleList));
    }

    #[test]
    fn invalid_lod_id_never_coalesces() {
        let data = raw_geometry(&[("group", vec![RawMesh::new("a", -1, 5.0), RawMesh::new("b", -1, 5.0)])]);
        let mut geometry = Geometry::new();
        geometry.from_raw_data(&data).unwrap();
        assert_eq!(geometry.lod_groups[0].lods.len(), 2);
    }

    #[test]
    fn generated_names() {
        // Given
        let data = raw_geometry(&[("", vec![RawMesh::new("", 0, 1.0)])]);

        // When
        let mut geometry = Geometry::new();
        geometry.from_raw_data(&data).unwrap();

        // Then
        let group = &geometry.lod_groups[0];
        assert!(group.name.starts_with("lod_"));
        assert_eq!(group.name.len(), "lod_".len() + 8);
        assert!(group.lods[0].meshes[0].name.starts_with("mesh_"));
    }

    #[test]
    fn truncated_raw_data() {
        setup_logger();
        let data = raw_geometry(&[("group", vec![RawMesh::new("a", 0, 5.0)])]);
        let mut geometry = Geometry::new();
        let result = geometry.from_raw_data(&data[..data.len() - 1]);
        assert!(matches!(result, Err(Error::InvalidAssetData { .. })));
        assert!(geometry.lod_groups.is_empty());
    }

    #[test]
    fn save_and_load_single_group() {
        setup_logger();

        // Given
        let root = TempDir::new("geometry").unwrap();
        let mut geometry = geometry_with_groups(1);
        geometry.import_settings.calculate_tangents = true;
        geometry.import_settings.smoothing_angle = 90.0;

        // When
        let saved = geometry.save(&root.path().join("model.asset")).unwrap();
        let loaded = Geometry::load(&saved[0]).unwrap();

        // Then
        assert_eq!(saved, vec![root.path().join("model.asset")]);
        assert_eq!(loaded.lod_groups, geometry.lod_groups);
        assert_eq!(loaded.import_settings, geometry.import_settings);
        assert_eq!(loaded.guid(), geometry.guid());
        assert_eq!(loaded.hash(), geometry.hash());
        assert_eq!(loaded.full_path(), Some(saved[0].as_path()));
    }

    #[test]
    fn save_fans_out_groups() {
        setup_logger();

        // Given
        let root = TempDir::new("geometry").unwrap();
        let mut geometry = geometry_with_groups(3);

        // When
        let saved = geometry.save(&root.path().join("scene.asset")).unwrap();

        // Then
        assert_eq!(
            saved,
            vec![
                root.path().join("scene_high0.asset"),
                root.path().join("scene_high1.asset"),
                root.path().join("scene_high2.asset"),
            ]
        );
        let mut guids = Vec::new();
        for (index, path) in saved.iter().enumerate() {
            let loaded = Geometry::load(path).unwrap();
            assert_eq!(loaded.lod_groups.len(), 1);
            assert_eq!(loaded.lod_groups[0], geometry.lod_groups[index]);
            guids.push(loaded.guid());
        }
        guids.sort();
        guids.dedup();
        assert_eq!(guids.len(), 3);
    }

    #[test]
    fn save_sanitizes_file_names() {
        let root = TempDir::new("geometry").unwrap();
        let mut geometry = geometry_with_groups(2);
        geometry.lod_groups[1].lods[0].name = "a:b?".to_owned();
        let saved = geometry.save(&root.path().join("scene.asset")).unwrap();
        assert_eq!(saved[1], root.path().join("scene_a_b_.asset"));
        assert!(saved[1].exists());
    }

    #[test]
    fn save_reuses_guid() {
        let root = TempDir::new("geometry").unwrap();
        let path = root.path().join("model.asset");
        let mut first = geometry_with_groups(1);
        first.save(&path).unwrap();

        let mut second = geometry_with_groups(1);
        second.save(&path).unwrap();

        assert_eq!(first.guid(), second.guid());
    }

    #[test]
    fn hash_ignores_import_settings() {
        let root = TempDir::new("geometry").unwrap();
        let mut first = geometry_with_groups(1);
        first.save(&root.path().join("first.asset")).unwrap();
        let mut second = geometry_with_groups(1);
        second.import_settings.reverse_handedness = true;
        second.save(&root.path().join("second.asset")).unwrap();
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn save_rejects_inconsistent_buffers() {
        setup_logger();
        let root = TempDir::new("geometry").unwrap();
        let mut geometry = geometry_with_groups(1);
        geometry.lod_groups[0].lods[0].meshes[0].indices.pop();
        let result = geometry.save(&root.path().join("broken.asset"));
        assert!(result.is_err());
        assert!(!root.path().join("broken.asset").exists());
    }

    #[test]
    fn load_corrupt_payload() {
        setup_logger();

        // Given
        let root = TempDir::new("geometry").unwrap();
        let path = root.path().join("model.asset");
        geometry_with_groups(1).save(&path).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        // When
        let result = Geometry::load(&path);

        // Then
        assert!(matches!(result, Err(Error::InvalidAssetData { .. })));
    }

    #[test]
    fn load_missing_file() {
        let root = TempDir::new("geometry").unwrap();
        let err = Geometry::load(&root.path().join("missing.asset")).unwrap_err();
        assert!(err.is_missing_file());
    }

    #[test]
    fn pack_for_engine_layout() {
        // Given
        let mut geometry = Geometry::new();
        geometry.lod_groups = vec![LodGroup {
            name: "group".to_owned(),
            lods: vec![MeshLod {
                name: "lod".to_owned(),
                lod_threshold: 4.0,
                meshes: vec![Mesh {
                    name: "mesh".to_owned(),
                    element_size: 3,
                    elements_type: ElementsType::COLORS,
                    topology: PrimitiveTopology::TriangleList,
                    vertex_count: 1,
                    index_size: 2,
                    index_count: 3,
                    positions: vec![1; 12],
                    elements: vec![2; 3],
                    indices: vec![3; 6],
                }],
            }],
        }];

        // When
        let packed = geometry.pack_for_engine().unwrap();

        // Then
        let mut reader = Cursor::new(&packed);
        assert_eq!(reader.read_u32::<LittleEndian>().unwrap(), 1);
        assert_eq!(reader.read_f32::<LittleEndian>().unwrap(), 4.0);
        assert_eq!(reader.read_u32::<LittleEndian>().unwrap(), 1);
        let submeshes_size = reader.read_u32::<LittleEndian>().unwrap();
        assert_eq!(submeshes_size, 5 * 4 + 12 + 4 + 6);
        assert_eq!(reader.read_u32::<LittleEndian>().unwrap(), 3);
        assert_eq!(reader.read_u32::<LittleEndian>().unwrap(), 1);
        assert_eq!(reader.read_u32::<LittleEndian>().unwrap(), 3);
        assert_eq!(reader.read_u32::<LittleEndian>().unwrap(), ElementsType::COLORS.bits());
        assert_eq!(reader.read_u32::<LittleEndian>().unwrap(), PrimitiveTopology::TriangleList as u32);
        assert_eq!(reader.read_bytes(12).unwrap(), vec![1; 12]);
        assert_eq!(reader.read_bytes(4).unwrap(), vec![2, 2, 2, 0]);
        assert_eq!(reader.read_bytes(6).unwrap(), vec![3; 6]);
        assert_eq!(reader.position() as usize, packed.len());
    }

    #[test]
    fn pack_for_engine_uses_first_group() {
        let geometry = geometry_with_groups(2);
        assert_eq!(geometry.pack_for_engine().unwrap(), geometry.pack_lod_group_for_engine(0).unwrap());
        assert_ne!(geometry.pack_for_engine().unwrap(), geometry.pack_lod_group_for_engine(1).unwrap());
        assert!(geometry.pack_lod_group_for_engine(2).is_err());
        assert!(Geometry::new().pack_for_engine().is_err());
    }

    #[test]
    fn import_through_scratch_copy() {
        setup_logger();

        // Given
        let root = TempDir::new("geometry").unwrap();
        let source = root.path().join("chair.fbx");
        fs::write(&source, b"chair").unwrap();
        let temp = root.path().join("temp");
        let tools = FakeContentTools::new();

        // When
        let mut geometry = Geometry::new();
        let embedded = geometry.import(&source, &tools, &temp).unwrap();

        // Then
        assert!(embedded.is_empty());
        assert_eq!(geometry.lod_groups.len(), 1);
        assert_eq!(fs::read_dir(&temp).unwrap().count(), 0);
        let imported = tools.imported_fbx_files();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].parent(), Some(temp.as_path()));
        assert_ne!(imported[0], source);
    }

    #[test]
    fn import_failure_keeps_previous_state() {
        setup_logger();
        let root = TempDir::new("geometry").unwrap();
        let source = root.path().join("broken.fbx");
        fs::write(&source, FakeContentTools::BROKEN).unwrap();
        let mut geometry = geometry_with_groups(1);
        let before = geometry.lod_groups.clone();

        let result = geometry.import(&source, &FakeContentTools::new(), &root.path().join("temp"));

        assert!(matches!(result, Err(Error::GeometryImport(_))));
        assert_eq!(geometry.lod_groups, before);
    }

    #[test]
    fn media_folder_removed_when_embedded_textures_are_skipped() {
        setup_logger();

        // Given
        let root = TempDir::new("geometry").unwrap();
        let source = root.path().join("house.fbx");
        fs::write(&source, b"house").unwrap();
        let temp = root.path().join("temp");
        let mut geometry = Geometry::new();
        geometry.import_settings.import_embedded_textures = false;

        // When
        let embedded = geometry.import(&source, &FakeContentTools::embedding_textures(), &temp).unwrap();

        // Then
        assert!(embedded.is_empty());
        assert_eq!(fs::read_dir(&temp).unwrap().count(), 0);
    }

    #[test]
    fn media_folder_removed_when_import_fails() {
        setup_logger();

        // Given
        let root = TempDir::new("geometry").unwrap();
        let source = root.path().join("broken.fbx");
        fs::write(&source, FakeContentTools::BROKEN).unwrap();
        let temp = root.path().join("temp");

        // When
        let result = Geometry::new().import(&source, &FakeContentTools::embedding_textures(), &temp);

        // Then
        assert!(matches!(result, Err(Error::GeometryImport(_))));
        assert_eq!(fs::read_dir(&temp).unwrap().count(), 0);
    }

    #[test]
    fn media_folder_returned_when_embedded_textures_are_imported() {
        setup_logger();
        let root = TempDir::new("geometry").unwrap();
        let source = root.path().join("house.fbx");
        fs::write(&source, b"house").unwrap();
        let temp = root.path().join("temp");

        let embedded = Geometry::new().import(&source, &FakeContentTools::embedding_textures(), &temp).unwrap();

        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].file_name().unwrap(), "wall.png");
        assert!(embedded[0].parent().unwrap().starts_with(&temp));
    }

    #[test]
    fn import_missing_file() {
        let root = TempDir::new("geometry").unwrap();
        let result = Geometry::new().import(&root.path().join("missing.fbx"), &FakeContentTools::new(), root.path());
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn create_primitive() {
        let info = PrimitiveInitInfo::new(PrimitiveMeshType::Cube);
        let geometry = Geometry::create_primitive(&FakeContentTools::new(), &info).unwrap();
        assert_eq!(geometry.lod_groups[0].name, "Cube");
        assert_eq!(geometry.lod_groups[0].lods[0].meshes.len(), 1);
    }

    #[test]
    fn import_settings_layout() {
        let mut buf = Vec::new();
        GeometryImportSettings::default().write(&mut buf).unwrap();
        let mut expected = vec![0u8, 0];
        expected.extend_from_slice(&178.0f32.to_le_bytes());
        expected.extend_from_slice(&[0, 1, 1]);
        assert_eq!(buf, expected);
        assert_eq!(GeometryImportSettings::read(Cursor::new(&buf)).unwrap(), GeometryImportSettings::default());
    }
}
