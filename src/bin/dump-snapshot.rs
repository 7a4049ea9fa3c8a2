use docopt::Docopt;
use serde::Deserialize;
use gl_snapshot::state::texture::TextureState;
use gl_snapshot::state::ObjectState;
use gl_snapshot::{files, ContextSnapshot, Namespace, PassError, PassReport};

use std::path::Path;

static USAGE: &str = "
Summarize a saved GL context snapshot.

Print how many objects of each kind the snapshot holds, and any records that
could not be loaded. With `--images`, also write every captured texture level
as a PNG file named `texture-H-L.png`, where H is the texture's recorded
handle and L is the mip level.

The snapshot may be a directory written by `files::save`, or a single archive
file written by `files::save_archive`.

Usage:
  dump-snapshot [--images] <snapshot>
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_snapshot: String,
    flag_images: bool,
}

fn main() -> Result<(), PassError> {
    env_logger::init();
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let path = Path::new(&args.arg_snapshot);
    let (snapshot, report): (ContextSnapshot, PassReport) = if path.is_dir() {
        files::load(path)?
    } else {
        files::load_archive(path)?
    };

    for &ns in Namespace::ALL.iter() {
        let count = snapshot.records(ns).count();
        if count > 0 {
            println!("{:>6} {}", count, ns);
        }
    }
    if let Some(attribs) = snapshot.current_vertex_attribs() {
        println!("{:>6} current vertex attributes", attribs.attribs().len());
    }
    if !report.is_clean() {
        print!("{}", report);
    }

    if args.flag_images {
        let mut count = 0;
        for record in snapshot.records(Namespace::Textures) {
            let texture = match record.as_any().downcast_ref::<TextureState>() {
                Some(texture) => texture,
                None => continue,
            };
            for level in texture.levels() {
                let filename = format!("texture-{}-{}.png", record.recorded_handle(), level.level);
                if let Err(e) = gl_snapshot::write_level(&filename, level) {
                    eprintln!("{}: {}", filename, e);
                    continue;
                }
                count += 1;
            }
        }
        println!("wrote {} texture images", count);
    }

    Ok(())
}
