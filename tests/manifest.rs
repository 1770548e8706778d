use anyhow::{anyhow, Result};

fn manifest() -> Result<toml::Table> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
    Ok(std::fs::read_to_string(path)?.parse::<toml::Table>()?)
}

fn strings(value: Option<&toml::Value>) -> Vec<String> {
    value
        .and_then(toml::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(toml::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn bin_required_features(manifest: &toml::Table, name: &str) -> Result<Vec<String>> {
    let bins = manifest
        .get("bin")
        .and_then(toml::Value::as_array)
        .ok_or_else(|| anyhow!("no [[bin]] entries"))?;
    let bin = bins
        .iter()
        .find(|bin| bin.get("name").and_then(toml::Value::as_str) == Some(name))
        .ok_or_else(|| anyhow!("no bin named {}", name))?;
    Ok(strings(bin.get("required-features")))
}

#[test]
fn terminal_binary_is_built_with_file_decoding() -> Result<()> {
    let manifest = manifest()?;
    let required = bin_required_features(&manifest, "trackview")?;
    assert!(required.iter().any(|feature| feature == "ingest-ffmpeg"));
    Ok(())
}

#[test]
fn gui_feature_enables_file_and_camera_sources() -> Result<()> {
    let manifest = manifest()?;
    let required = bin_required_features(&manifest, "trackview-gui")?;
    assert!(required.iter().any(|feature| feature == "gui"));

    let gui = strings(
        manifest
            .get("features")
            .and_then(|features| features.get("gui")),
    );
    for feature in ["ingest-ffmpeg", "ingest-v4l2"] {
        assert!(gui.iter().any(|f| f == feature), "gui lacks {}", feature);
    }
    Ok(())
}
