//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the enrollment API. The output path is the first
//! argument, or `openapi.json` in the working directory.

use api_lib::web::rest::ApiDoc;
use std::path::PathBuf;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("openapi.json"));
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let doc = ApiDoc::openapi();
    std::fs::write(&path, doc.to_pretty_json()?)?;
    println!(
        "Wrote {} paths for {} v{} to {}",
        doc.paths.paths.len(),
        doc.info.title,
        doc.info.version,
        path.display()
    );
    Ok(())
}
