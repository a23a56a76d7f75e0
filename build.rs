use std::env;
use std::fs::File;
use std::path::Path;

use gl_generator::{Api, Fallbacks, GlobalGenerator, Profile, Registry};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let out_dir = env::var("OUT_DIR").unwrap();
    let mut bindings = File::create(Path::new(&out_dir).join("bindings.rs")).unwrap();
    // Desktop core profile: the G-buffer pass needs MULTISAMPLE, ClearDepth
    // and multiple color attachments.
    Registry::new(Api::Gl, (3, 3), Profile::Core, Fallbacks::All, [])
        .write_bindings(GlobalGenerator, &mut bindings)
        .unwrap();
}
