use std::env;
use std::process;

use log::{debug, info};

use agipatch::filestore::{DirStore, FileStore};
use agipatch::patch::{apply_patch, create_patch, project_digest, PatchContainer};
use agipatch::project::{decode_project, encode_project, ResourceSlots};

fn usage(program: &str) {
    println!("agipatch - create and apply patches for AGI game resource bundles");
    println!();
    println!("Usage: {} <command> [args]", program);
    println!();
    println!("Commands:");
    println!("  create <original-dir> <modified-dir> <patch-out-dir>");
    println!("      Diff two game directories and write patch.json + bytepool.dat");
    println!("  apply <original-dir> <patch-dir> <out-dir>");
    println!("      Apply a patch to a game directory and write the result");
    println!("  info <dir>");
    println!("      Decode a game directory and print a summary");
}

fn count_slots<T>(slots: &ResourceSlots<T>) -> (usize, usize) {
    let occupied = slots.iter().flatten().count();
    let invalid = slots
        .iter()
        .flatten()
        .filter(|state| state.present().is_none())
        .count();
    (occupied, invalid)
}

fn load_project(dir: &str) -> Result<agipatch::project::Project, String> {
    let store = DirStore::new(dir);
    debug!("loading AGI project from {}", dir);
    decode_project(&store).map_err(|e| format!("{}: {}", dir, e))
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        return Ok(());
    }

    match args[1].as_str() {
        "create" if args.len() == 5 => {
            let original = load_project(&args[2])?;
            let modified = load_project(&args[3])?;
            let created = create_patch(&original, &modified);
            let json = serde_json::to_vec_pretty(&created.container)
                .map_err(|e| format!("failed to serialize patch: {}", e))?;
            let mut out = DirStore::new(&args[4]);
            out.write("patch.json", json)?;
            out.write("bytepool.dat", created.pool)?;
            println!("Patch written to {}", args[4]);
            Ok(())
        }
        "apply" if args.len() == 5 => {
            let original = load_project(&args[2])?;
            let patch_store = DirStore::new(&args[3]);
            let json = patch_store
                .read("patch.json")
                .ok_or_else(|| format!("{}: patch.json not found", args[3]))?;
            let pool = patch_store.read("bytepool.dat").unwrap_or_default();
            let container: PatchContainer = serde_json::from_slice(&json)
                .map_err(|e| format!("failed to parse patch.json: {}", e))?;
            let patched =
                apply_patch(&original, &container, &pool).map_err(|e| e.to_string())?;
            let mut out = DirStore::new(&args[4]);
            encode_project(&patched, &mut out)?;
            println!("Patched game written to {}", args[4]);
            Ok(())
        }
        "info" if args.len() == 3 => {
            let project = load_project(&args[2])?;
            println!("Digest:   {}", project_digest(&project));
            println!("Layout:   {:?}", project.packed_dirs);
            println!("Words:    {}", project.words.words.len());
            println!("Objects:  {}", project.objects.objects.len());
            for (name, counts) in [
                ("Logic", count_slots(&project.logic)),
                ("Pictures", count_slots(&project.pictures)),
                ("Sounds", count_slots(&project.sounds)),
                ("Views", count_slots(&project.views)),
            ] {
                let (occupied, invalid) = counts;
                if invalid > 0 {
                    println!("{}: {} ({} invalid)", name, occupied, invalid);
                } else {
                    println!("{}: {}", name, occupied);
                }
            }
            Ok(())
        }
        _ => {
            usage(&args[0]);
            Err(format!("unrecognized or incomplete command: {}", args[1]))
        }
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    info!("done");
}
