//! # Overview
//!
//! Content pipeline that turns source files of artists into asset files for the engine.
//!
//! Source files are imported by the [`ContentImporter`]. It picks the codec by the extension
//! of the file and asks the native library (see [`ContentTools`](content_tools::ContentTools))
//! to decode the source. The codec turns the decoded buffers into its in-memory model and
//! saves it as an asset file into the content folder of the project:
//!
//! ```text
//! sources/                       content/
//! ├─ house.fbx     ── import ──▶ ├─ house.asset
//! ├─ brick.png                   ├─ brick.asset
//! ```
//!
//! Every asset file starts with an [`AssetHeader`](asset_file::AssetHeader) that contains the
//! GUID, the [`AssetType`], and a hash of the payload. The [`AssetRegistry`] keeps an index of
//! all asset files in the content folder and follows the changes on disk with a file watcher.
//! The watcher is suspended while an import batch is running.
//!
//! # Codecs
//!
//! * [`Geometry`](geometry::Geometry): LOD groups of meshes with vertex and index buffers.
//! * [`Texture`](texture::Texture): slices of texture arrays, mips, and volume layers.

mod asset;
pub mod asset_file;
mod binary_io;
mod common;
pub mod compression;
pub mod config;
pub mod content_tools;
pub mod geometry;
pub mod hashing;
mod import;
mod observers;
mod registry;
pub mod texture;

#[cfg(test)]
mod test_utils;

pub use asset::*;
pub use common::{is_asset_file, is_older, random_string, sanitize_file_name, Error, Result, ASSET_FILE_EXTENSION};
pub use import::*;
pub use registry::*;
