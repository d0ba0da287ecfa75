//! Pixelscope image analysis CLI tool
//!
//! Command-line interface for running the pixelscope analysis pipeline on a
//! single image: color histogram, deep embedding and semantic segmentation.

#[cfg(feature = "cli")]
use pixelscope::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
