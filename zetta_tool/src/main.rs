use std::{fs, io, path::PathBuf};

use clap::Parser;
use color_eyre as ey;
use ey::eyre::{eyre, Context};
use zetta_content::{
    asset_file::read_asset_header,
    config::{ContentConfig, CONFIG_FILE_NAME},
    geometry::Geometry,
    hashing::hash_to_hex,
    load_asset, Asset, AssetRegistry, LoadedAsset, RegistryEvent,
};
use zetta_shared::log::{self, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
enum CommandLineArguments {
    /// Lists all assets in a content folder
    Scan(ContentFolder),
    /// Prints the header and a summary of an asset file
    Inspect {
        /// Asset file
        file: PathBuf,
    },
    /// Packs a geometry asset into the layout that the engine loads
    Pack {
        /// Geometry asset file
        source_filepath: PathBuf,

        /// Destination file
        destination_filepath: PathBuf,

        /// Index of the LOD group that is packed
        #[clap(short, long, default_value = "0")]
        lod_group: usize,
    },
    /// Prints the changes of a content folder until the process is stopped
    Watch(ContentFolder),
}

#[derive(Parser, Debug)]
struct ContentFolder {
    /// Content folder. Taken from the configuration when omitted.
    content: Option<PathBuf>,

    /// Configuration file of the project
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,
}

impl ContentFolder {
    fn config(&self) -> ey::Result<ContentConfig> {
        match &self.content {
            Some(content) => Ok(ContentConfig::new(content)),
            None => ContentConfig::from_yaml_file(&self.config)
                .wrap_err_with(|| format!("Failed to read configuration {:?}", self.config)),
        }
    }
}

fn main() -> ey::Result<()> {
    // Setup logging
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                zetta_shared::chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("notify", log::LevelFilter::Warn)
        .chain(io::stdout())
        .apply()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

    let command_line_arguments = CommandLineArguments::parse();
    match &command_line_arguments {
        CommandLineArguments::Scan(content_folder) => {
            let config = content_folder.config()?;
            let registry = AssetRegistry::from_config(&config).wrap_err("Failed to scan content folder")?;
            for asset_info in registry.assets() {
                println!(
                    "{} {:<10} {:>10} B  {}",
                    asset_info.guid,
                    asset_info.asset_type.to_string(),
                    asset_info.size,
                    asset_info.full_path.display()
                );
            }
            info!("Found {} assets", registry.len());
        }
        CommandLineArguments::Inspect { file } => {
            let header = read_asset_header(file).wrap_err("Failed to read asset header")?;
            println!("guid:    {}", header.guid);
            println!("type:    {}", header.asset_type);
            println!("version: {}", header.version);
            println!("hash:    {}", hash_to_hex(&header.hash));
            println!("icon:    {} B", header.icon.len());
            match load_asset(file).wrap_err("Failed to load asset")? {
                LoadedAsset::Geometry(geometry) => {
                    for lod_group in &geometry.lod_groups {
                        println!("lod group '{}'", lod_group.name);
                        for lod in &lod_group.lods {
                            println!("  lod '{}' threshold {}", lod.name, lod.lod_threshold);
                            for mesh in &lod.meshes {
                                println!(
                                    "    mesh '{}': {} vertices, {} indices, {:?}",
                                    mesh.name, mesh.vertex_count, mesh.index_count, mesh.elements_type
                                );
                            }
                        }
                    }
                }
                LoadedAsset::Texture(texture) => {
                    println!(
                        "texture {}x{}, {} array elements, {} mips, {}, {:?}",
                        texture.width(),
                        texture.height(),
                        texture.array_size(),
                        texture.mip_levels(),
                        texture.format(),
                        texture.flags()
                    );
                }
            }
        }
        CommandLineArguments::Pack {
            source_filepath,
            destination_filepath,
            lod_group,
        } => {
            info!("Loading geometry: {source_filepath:?}");
            let geometry = Geometry::load(source_filepath).wrap_err("Failed to load geometry")?;
            if *lod_group >= geometry.lod_groups.len() {
                return Err(eyre!(
                    "LOD group {lod_group} doesn't exist, the geometry has {} groups",
                    geometry.lod_groups.len()
                ));
            }
            let packed = geometry
                .pack_lod_group_for_engine(*lod_group)
                .wrap_err("Failed to pack geometry")?;
            fs::write(destination_filepath, &packed).wrap_err("Failed to write packed geometry")?;
            info!("Wrote {} bytes to {destination_filepath:?}", packed.len());
        }
        CommandLineArguments::Watch(content_folder) => {
            let config = content_folder.config()?;
            let registry = AssetRegistry::from_config(&config).wrap_err("Failed to watch content folder")?;
            let receiver = registry.observe();
            info!("Watching {:?} with {} assets", config.content_path, registry.len());
            for event in receiver {
                match event {
                    RegistryEvent::Registered(path) => println!("+ {}", path.display()),
                    RegistryEvent::Updated(path) => println!("~ {}", path.display()),
                    RegistryEvent::Unregistered(path) => println!("- {}", path.display()),
                }
            }
        }
    }
    Ok(())
}
