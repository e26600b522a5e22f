use crossfire_api::router::ApiDoc;
use std::path::Path;
use utoipa::OpenApi;

/// Writes the OpenAPI document for the setup endpoints to `path`.
fn write_openapi(path: &Path) -> anyhow::Result<()> {
    let json = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(path, json)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());
    write_openapi(Path::new(&path))?;
    println!("Wrote {path}");
    Ok(())
}
