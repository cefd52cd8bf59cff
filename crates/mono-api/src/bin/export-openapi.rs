use std::{env, fs, path::Path};

use anyhow::{Context, Result};
use mono_api::server::docs::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<()> {
    let output = env::args().nth(1);
    let yaml = ApiDoc::openapi()
        .to_yaml()
        .context("failed to serialise OpenAPI document")?;

    match output {
        Some(path) => {
            let path = Path::new(&path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create directory for {}", path.display())
                })?;
            }
            fs::write(path, yaml).with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => println!("{yaml}"),
    }

    Ok(())
}
