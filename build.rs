fn main() {
    println!("cargo:rerun-if-changed=migrations");

    // Embeds git/build metadata as `built.rs` in OUT_DIR.
    if let Err(err) = built::write_built_file() {
        panic!("failed to acquire build-time information: {err}");
    }
}
