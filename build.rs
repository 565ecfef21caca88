fn main() {
    // The editor shell is embedded with rust-embed; rebuild when it changes.
    println!("cargo:rerun-if-changed=ui/dist");
}
