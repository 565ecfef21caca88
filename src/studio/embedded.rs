use rust_embed::RustEmbed;

/// Editor shell assets, compiled into the binary in release builds and read
/// from disk in debug builds.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/ui/dist"]
pub struct Assets;
