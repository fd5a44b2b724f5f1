use std::{
    fs,
    path::{Path, PathBuf},
    result,
    sync::atomic::{AtomicUsize, Ordering},
};

use zetta_shared::{
    byteorder::{LittleEndian, WriteBytesExt},
    parking_lot::Mutex,
};

use crate::{
    binary_io::WriteBinaryExt,
    content_tools::{ContentTools, PrimitiveInitInfo, TextureData, TextureImportError, TextureInfo},
    geometry::{ElementsType, GeometryImportSettings, Mesh, PrimitiveTopology},
    texture::{slices_to_binary, DxgiFormat, Slice, Slices, TextureFlags, TextureImportSettings},
    Error, Result,
};

/// Mesh record of the raw scene layout.
pub struct RawMesh {
    pub name: String,
    pub lod_id: i32,
    pub lod_threshold: f32,
}

impl RawMesh {
    pub fn new(name: &str, lod_id: i32, lod_threshold: f32) -> Self {
        Self {
            name: name.to_owned(),
            lod_id,
            lod_threshold,
        }
    }
}

/// Mesh with deterministic buffers.
pub fn test_mesh(name: &str, elements_type: ElementsType, vertex_count: u32) -> Mesh {
    let element_size = elements_type.stride();
    let index_count = 3;
    Mesh {
        name: name.to_owned(),
        element_size,
        elements_type,
        topology: PrimitiveTopology::TriangleList,
        vertex_count,
        index_size: 4,
        index_count,
        positions: (0..vertex_count * Mesh::POSITION_SIZE).map(|i| i as u8).collect(),
        elements: (0..vertex_count * element_size).map(|i| (i * 7) as u8).collect(),
        indices: (0..index_count).flat_map(|i| (i % vertex_count).to_le_bytes()).collect(),
    }
}

/// Creates the raw scene layout that the native library produces.
pub fn raw_geometry(groups: &[(&str, Vec<RawMesh>)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.write_string("scene").unwrap();
    data.write_i32::<LittleEndian>(groups.len() as i32).unwrap();
    for (name, meshes) in groups {
        data.write_string(name).unwrap();
        data.write_i32::<LittleEndian>(meshes.len() as i32).unwrap();
        for raw_mesh in meshes {
            let mesh = test_mesh(&raw_mesh.name, ElementsType::NORMALS, 4);
            data.write_string(&raw_mesh.name).unwrap();
            data.write_i32::<LittleEndian>(raw_mesh.lod_id).unwrap();
            data.write_i32::<LittleEndian>(mesh.element_size as i32).unwrap();
            data.write_u32::<LittleEndian>(mesh.elements_type.bits()).unwrap();
            data.write_i32::<LittleEndian>(mesh.vertex_count as i32).unwrap();
            data.write_i32::<LittleEndian>(mesh.index_size as i32).unwrap();
            data.write_i32::<LittleEndian>(mesh.index_count as i32).unwrap();
            data.write_f32::<LittleEndian>(raw_mesh.lod_threshold).unwrap();
            data.extend_from_slice(&mesh.positions);
            data.extend_from_slice(&mesh.elements);
            data.extend_from_slice(&mesh.indices);
        }
    }
    data
}

/// Creates slices with RGBA8 content that follow the depth schedule of [`depth_per_mip`](crate::texture::depth_per_mip).
pub fn test_slices(array_size: u32, mip_levels: u32, is_volume_map: bool) -> Slices {
    let depth_per_mip = crate::texture::depth_per_mip(array_size, mip_levels, is_volume_map);
    let array_size = if is_volume_map { 1 } else { array_size };
    (0..array_size)
        .map(|array_index| {
            depth_per_mip
                .iter()
                .enumerate()
                .map(|(mip, depth)| {
                    let size = (8u32 >> mip.min(3)).max(1);
                    (0..*depth)
                        .map(|depth_index| Slice {
                            width: size,
                            height: size,
                            row_pitch: size * 4,
                            slice_pitch: size * size * 4,
                            raw_content: (0..size * size * 4)
                                .map(|i| (i + array_index * 31 + mip as u32 * 7 + depth_index * 3) as u8)
                                .collect(),
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Deterministic stand-in for the native library.
///
/// Sources whose content equals [`FakeContentTools::BROKEN`] fail to import.
#[derive(Default)]
pub struct FakeContentTools {
    imported_fbx_files: Mutex<Vec<PathBuf>>,
    decompress_calls: AtomicUsize,
    embeds_textures: bool,
}

impl FakeContentTools {
    pub const BROKEN: &'static [u8] = b"broken";

    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `wall.png` into the media folder next to every scene like the native library does
    /// for embedded textures. The folder is written before the scene is parsed.
    pub fn embedding_textures() -> Self {
        Self {
            embeds_textures: true,
            ..Self::default()
        }
    }

    pub fn imported_fbx_files(&self) -> Vec<PathBuf> {
        self.imported_fbx_files.lock().clone()
    }

    pub fn decompress_calls(&self) -> usize {
        self.decompress_calls.load(Ordering::SeqCst)
    }
}

fn is_broken(path: &Path) -> bool {
    fs::read(path).is_ok_and(|content| content == FakeContentTools::BROKEN)
}

impl ContentTools for FakeContentTools {
    fn import_fbx(&self, file: &Path, _settings: &GeometryImportSettings) -> Result<Vec<u8>> {
        self.imported_fbx_files.lock().push(file.to_owned());
        if self.embeds_textures {
            let media_folder = file.with_extension("fbm");
            fs::create_dir_all(&media_folder)?;
            fs::write(media_folder.join("wall.png"), "embedded")?;
        }
        if is_broken(file) {
            return Err(Error::GeometryImport(format!("failed to read scene '{}'", file.display())));
        }
        Ok(raw_geometry(&[("scene", vec![RawMesh::new("body", 0, 10.0), RawMesh::new("body_low", 1, 2.0)])]))
    }

    fn create_primitive_mesh(&self, info: &PrimitiveInitInfo, _settings: &GeometryImportSettings) -> Result<Vec<u8>> {
        let name = format!("{:?}", info.mesh_type);
        Ok(raw_geometry(&[(name.as_str(), vec![RawMesh::new(&name, 0, 0.0)])]))
    }

    fn import_texture(&self, settings: &TextureImportSettings) -> result::Result<TextureData, TextureImportError> {
        let source = settings.sources.first().ok_or(TextureImportError::FileNotFound)?;
        if !source.exists() {
            return Err(TextureImportError::FileNotFound);
        }
        if is_broken(source) {
            return Err(TextureImportError::Load);
        }
        let slices = test_slices(1, 4, false);
        let subresource_data = slices_to_binary(&slices).map_err(|_| TextureImportError::Unknown)?;
        let (format, icon) = if settings.compress {
            let icon = slices_to_binary(&vec![vec![vec![slices[0][0][0].clone()]]]).map_err(|_| TextureImportError::Unknown)?;
            (settings.output_format(), Some(icon))
        } else {
            (DxgiFormat::R8G8B8A8_UNORM, None)
        };
        let format = if format == DxgiFormat::UNKNOWN { DxgiFormat::BC7_UNORM } else { format };
        Ok(TextureData {
            info: TextureInfo {
                width: 8,
                height: 8,
                array_size: 1,
                mip_levels: 4,
                format,
                flags: TextureFlags::HAS_ALPHA,
            },
            subresource_data,
            icon,
        })
    }

    fn decompress_texture(&self, texture: &TextureData) -> result::Result<TextureData, TextureImportError> {
        self.decompress_calls.fetch_add(1, Ordering::SeqCst);
        let mut decompressed = texture.clone();
        decompressed.info.format = DxgiFormat::R8G8B8A8_UNORM;
        Ok(decompressed)
    }
}
