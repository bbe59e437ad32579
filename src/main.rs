use asset_registry::errors::RegistryError;
use asset_registry::path_tree::PathTree;
use asset_registry::serialization::{RegistrySnapshot, SnapshotReader};
use std::fs::File;
use std::io::BufReader;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<(), RegistryError> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();

    let Some(file_path) = args.get(1) else {
        eprintln!("usage: asset-registry <snapshot> [-assets] [-tags] [-dependencies] [-paths]");
        std::process::exit(2);
    };

    let args_lower: Vec<String> = args.iter().map(|s| s.to_lowercase()).collect();

    let show_assets = args_lower.contains(&"-assets".to_string());
    let show_tags = args_lower.contains(&"-tags".to_string());
    let show_dependencies = args_lower.contains(&"-dependencies".to_string());
    let show_paths = args_lower.contains(&"-paths".to_string());

    let file = File::open(file_path)?;
    let snapshot = SnapshotReader::new(BufReader::new(file)).read_snapshot()?;

    print_snapshot(&snapshot, show_assets || show_tags, show_tags, show_dependencies, show_paths);

    Ok(())
}

fn print_snapshot(
    snapshot: &RegistrySnapshot,
    show_assets: bool,
    show_tags: bool,
    show_dependencies: bool,
    show_paths: bool,
) {
    println!("Version: {:?}", snapshot.version());
    println!("Assets : {}", snapshot.assets.len());

    if show_assets {
        for (idx, asset) in snapshot.assets.iter().enumerate() {
            println!("\nAsset {}\n", idx);
            println!("ObjectPath : {}", asset.object_path);
            println!("AssetClass : {}", asset.asset_class);
            println!("Kind       : {:?}", asset.kind);
            println!("Flags      : {:#010x}", asset.package_flags);
            if !asset.chunk_ids.is_empty() {
                println!("ChunkIds   : {:?}", asset.chunk_ids);
            }

            if show_tags {
                for (k, v) in &asset.tags {
                    println!("Tag {}: {}", k, v);
                }
            }
        }
    }

    if show_dependencies {
        println!("\nDependencies");
        for (idx, block) in snapshot.dependencies.iter().enumerate() {
            if block.is_empty() {
                continue;
            }
            let Some(package_name) = snapshot.package_name_at(idx) else {
                continue;
            };
            println!("\n{}", package_name);

            let lists = [("hard", &block.hard), ("soft", &block.soft), ("referenced by", &block.referencers)];
            for (label, indices) in lists {
                for &target in indices.iter() {
                    let name = snapshot.package_name_at(target).unwrap_or("InvalidIndex");
                    println!("  {}: {}", label, name);
                }
            }
        }
    }

    if show_paths {
        println!("\nPaths");
        let mut tree = PathTree::new();
        for asset in &snapshot.assets {
            tree.cache_path(&asset.package_path);
        }
        for path in tree.all_paths() {
            println!("{}", path);
        }
    }
}
