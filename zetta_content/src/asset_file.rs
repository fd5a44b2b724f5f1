//! Assets are written to files in a custom format that contains a header and the asset content.
//!
//! ## Overview
//!
//! The header identifies the file as an asset file and carries the bookkeeping that the
//! [`AssetRegistry`](crate::AssetRegistry) needs without decoding the content: the GUID, the
//! type of the asset, the content hash and the icon. All numbers are little-endian.
//!
//! Header:
//!
//! | Field        | Type   | Size (bytes) | Description                               |
//! |--------------|--------|--------------|-------------------------------------------|
//! | Magic        | u8[16] | 16           | 5a3e7c81-9d24-4b6f-a0e3-c71f28d94b56      |
//! | Version      | u32    | 4            | 1                                         |
//! | Guid         | u8[16] | 16           | Identity of the asset                     |
//! | Type         | i32    | 4            | [`AssetType`]                             |
//! | Hash length  | u32    | 4            | Length of the hash                        |
//! | Hash         | u8[]   | variable     | SHA-256 of the payload                    |
//! | Icon length  | u32    | 4            | Length of the icon, 0 if there is no icon |
//! | Icon         | u8[]   | variable     | PNG encoded thumbnail                     |
//!
//! The content of the asset file is written directly after the header. It starts with the
//! import settings of the asset type followed by the length-prefixed payload. Consider that the
//! header has a variable length, so the content can only be found by reading the header first.
//!
//! [`write_asset`] and [`read_asset`] work on any stream. [`write_asset_file`],
//! [`read_asset_file`] and [`read_asset_header`] do the same for a file on disk.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use zetta_shared::{
    byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
    log::{error, trace},
    uuid::Uuid,
};

use crate::{
    binary_io::{ReadBinaryExt, WriteBinaryExt},
    AssetType, Error, Result,
};

/* UUID string: 5a3e7c81-9d24-4b6f-a0e3-c71f28d94b56 */
pub const MAGIC: [u8; 16] = [
    0x5a, 0x3e, 0x7c, 0x81, 0x9d, 0x24, 0x4b, 0x6f, 0xa0, 0xe3, 0xc7, 0x1f, 0x28, 0xd9, 0x4b, 0x56,
];

/// Version of the asset file format.
pub const VERSION: u32 = 1;

/// Header that is written at the beginning of an asset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHeader {
    pub magic: [u8; 16],
    pub version: u32,
    pub guid: Uuid,
    pub asset_type: AssetType,
    pub hash: Vec<u8>,
    pub icon: Vec<u8>,
}

/// Turns a short read of a header field into an error that names the field.
fn header_field<T>(result: io::Result<T>, field: &str) -> io::Result<T> {
    result.map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("Failed to read {field}: {err}")))
}

impl AssetHeader {
    /// Creates a header with the current magic and version.
    pub fn new(guid: Uuid, asset_type: AssetType, hash: Vec<u8>, icon: Vec<u8>) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            guid,
            asset_type,
            hash,
            icon,
        }
    }

    /// Reads the header fields without validating magic and version. See [`AssetHeader::check`].
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut magic = [0u8; 16];
        header_field(reader.read_exact(&mut magic), "magic number")?;
        let version = header_field(reader.read_u32::<LittleEndian>(), "version")?;
        let mut guid = [0u8; 16];
        header_field(reader.read_exact(&mut guid), "guid")?;

        let raw_type = header_field(reader.read_i32::<LittleEndian>(), "asset type")?;
        let asset_type = AssetType::from_i32(raw_type)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("Unknown asset type {raw_type}")))?;

        let hash = header_field(reader.read_blob(), "hash")?;
        let icon = header_field(reader.read_blob(), "icon")?;
        Ok(Self {
            magic,
            version,
            guid: Uuid::from_bytes(guid),
            asset_type,
            hash,
            icon,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_all(self.guid.as_bytes())?;
        writer.write_i32::<LittleEndian>(self.asset_type as i32)?;
        writer.write_blob(&self.hash)?;
        writer.write_blob(&self.icon)
    }

    /// Checks if the header is valid.
    pub fn check(&self) -> io::Result<()> {
        if self.magic != MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid magic number"));
        }
        if self.version != VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported version {}, expected {VERSION}", self.version),
            ));
        }
        Ok(())
    }
}

/// Reads a header and rejects it when magic or version don't match.
fn read_valid_header<R: Read>(reader: R) -> io::Result<AssetHeader> {
    let header = AssetHeader::read(reader)?;
    header.check()?;
    Ok(header)
}

/// Writes the header followed by the content.
///
/// # Example
///
/// ```rust
/// use zetta_content::{asset_file::{read_asset, write_asset, AssetHeader}, AssetType};
/// use zetta_shared::uuid::Uuid;
///
/// let header = AssetHeader::new(Uuid::new_v4(), AssetType::Mesh, vec![1, 2, 3], Vec::new());
/// let mut buf = Vec::new();
/// write_asset(&mut buf, &header, b"Hello, World!").unwrap();
///
/// let (read_header, content) = read_asset(buf.as_slice()).unwrap();
/// assert_eq!(read_header, header);
/// assert_eq!(content, b"Hello, World!");
/// ```
pub fn write_asset<W: Write>(mut writer: W, header: &AssetHeader, content: &[u8]) -> io::Result<()> {
    header.write(&mut writer)?;
    writer.write_all(content)?;
    writer.flush()
}

/// Reads and checks the header and returns it together with everything that follows it.
///
/// # Example
///
/// ```rust
/// use zetta_content::{asset_file::{read_asset, AssetHeader}, AssetType};
/// use zetta_shared::uuid::Uuid;
///
/// let mut header = AssetHeader::new(Uuid::new_v4(), AssetType::Texture, Vec::new(), Vec::new());
/// header.version += 1;
/// let mut buf = Vec::new();
/// header.write(&mut buf).unwrap();
///
/// assert!(read_asset(buf.as_slice()).is_err());
/// ```
pub fn read_asset<R: Read>(mut reader: R) -> io::Result<(AssetHeader, Vec<u8>)> {
    let header = read_valid_header(&mut reader)?;
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    Ok((header, content))
}

/// Writes an asset file. The file is written next to the destination first and then renamed so
/// that observers never see a partially written asset.
pub fn write_asset_file(path: &Path, header: &AssetHeader, content: &[u8]) -> Result<()> {
    let mut temporary_path = path.as_os_str().to_owned();
    temporary_path.push(".tmp");
    let temporary_path = PathBuf::from(temporary_path);

    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_asset(BufWriter::new(File::create(&temporary_path)?), header, content)?;
        fs::rename(&temporary_path, path)
    };
    write().map_err(|err| {
        error!("Failed to write asset file '{}': {err}", path.display());
        if temporary_path.exists() {
            if let Err(err) = fs::remove_file(&temporary_path) {
                error!("Failed to remove temporary file '{}': {err}", temporary_path.display());
            }
        }
        Error::from(err)
    })?;
    trace!("Wrote asset file '{}' ({} content bytes)", path.display(), content.len());
    Ok(())
}

fn open_asset_file(path: &Path) -> Result<BufReader<File>> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_owned()));
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Reads the header and the whole content of an asset file.
pub fn read_asset_file(path: &Path) -> Result<(AssetHeader, Vec<u8>)> {
    read_asset(open_asset_file(path)?).map_err(|err| Error::invalid_data(path, err))
}

/// Reads only the header of an asset file.
pub fn read_asset_header(path: &Path) -> Result<AssetHeader> {
    read_valid_header(open_asset_file(path)?).map_err(|err| Error::invalid_data(path, err))
}
