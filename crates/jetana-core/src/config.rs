//! Decoding of YAML/JSON settings files into typed configuration.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::Result;

/// Decode YAML (JSON documents are valid YAML too).
pub fn from_yaml_str<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_yaml_ng::from_str(text)?)
}

/// Decode strict JSON.
pub fn from_json_str<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}

/// Read a settings file. A `.json` extension selects the JSON decoder,
/// anything else is read as YAML.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => from_json_str(&text),
        _ => from_yaml_str(&text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::paths::ResolverConfig;

    fn tmp_file(name: &str, text: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!("jetana-config-{}-{}", std::process::id(), name));
        std::fs::write(&p, text).unwrap();
        p
    }

    #[test]
    fn partial_yaml_keeps_default_tokens() {
        let cfg: ResolverConfig = from_yaml_str("base_dir: /data/pp\njet_algo: ak8\n").unwrap();
        assert_eq!(cfg.base_dir, std::path::PathBuf::from("/data/pp"));
        assert_eq!(cfg.jet_algo, "ak8");
        assert_eq!(cfg.collision_tag, "pPb8160");
        assert_eq!(cfg.mc_default_systematics, "def");
    }

    #[test]
    fn decode_failures_map_to_format_variants() {
        let err = from_yaml_str::<ResolverConfig>("jet_algo: [unclosed\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)), "got {:?}", err);

        let err = from_json_str::<ResolverConfig>("{\"jet_algo\": ").unwrap_err();
        assert!(matches!(err, Error::Json(_)), "got {:?}", err);
    }

    #[test]
    fn extension_selects_decoder() {
        let json = tmp_file("resolver.json", r#"{"collision_tag": "pp5020"}"#);
        let cfg: ResolverConfig = load_file(&json).unwrap();
        assert_eq!(cfg.collision_tag, "pp5020");

        // trailing garbage is rejected by the JSON decoder
        let bad = tmp_file("bad.json", r#"{"collision_tag": "pp5020"} x"#);
        assert!(matches!(load_file::<ResolverConfig>(&bad), Err(Error::Json(_))));

        let yaml = tmp_file("resolver.yaml", "collision_tag: PbPb5020\n");
        let cfg: ResolverConfig = load_file(&yaml).unwrap();
        assert_eq!(cfg.collision_tag, "PbPb5020");

        for p in [json, bad, yaml] {
            std::fs::remove_file(p).ok();
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_file::<ResolverConfig>(Path::new("/nonexistent/jetana.yaml")).unwrap_err();
        assert!(err.is_not_found());
    }
}
