use std::fs;

fn main() {
    // The VERSION file is the single source of truth for release tooling;
    // refuse to build if it drifts from Cargo.toml.
    let version_file = fs::read_to_string("VERSION")
        .expect("VERSION file not found - run: echo '0.1.0' > VERSION");
    let version = version_file.trim();

    let cargo_version = env!("CARGO_PKG_VERSION");
    if version != cargo_version {
        panic!(
            "\n\n\
            ❌ VERSION MISMATCH!\n\
            VERSION file: {}\n\
            Cargo.toml:   {}\n\n\
            Update Cargo.toml to {} before building.\n\n",
            version, cargo_version, version
        );
    }

    println!("cargo:rerun-if-changed=VERSION");
}
