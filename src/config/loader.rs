//! Configuration loading: TOML file plus environment overrides.

use std::path::Path;

use crate::Result;
use crate::config::Config;

/// Load configuration from an optional TOML file and `SUBWATCH_*`
/// environment variables.
///
/// Without an explicit path, `~/.config/subwatch/config.toml` (when
/// present) and then `./subwatch.toml` are consulted. Environment keys use
/// `__` as the section separator, so `SUBWATCH_WATCHER__SCAN_INTERVAL_SECS=60`
/// overrides `watcher.scan_interval_secs`. Comma-separated values are
/// accepted for list-typed keys such as `watcher.watch_dirs`.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    } else {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("subwatch").join("config.toml");
            builder = builder.add_source(config::File::from(user_config).required(false));
        }
        builder = builder.add_source(config::File::with_name("subwatch").required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("SUBWATCH")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("watcher.watch_dirs")
            .with_list_parse_key("asr.language_hints")
            .with_list_parse_key("audio.prefer_langs")
            .with_list_parse_key("audio.exclude_titles")
            .with_list_parse_key("subtitle.prefer_langs_src")
            .with_list_parse_key("subtitle.prefer_langs_dst")
            .with_list_parse_key("subtitle.exclude_titles")
            .with_list_parse_key("translate.dst_langs")
            .with_list_parse_key("metadata.language_priority")
            .with_list_parse_key("hotwords.langs")
            .try_parsing(true),
    );
    let raw = builder.build()?;
    let config: Config = raw.try_deserialize()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subwatch.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[watcher]\nwatch_dirs = [\"/media/incoming\"]\nscan_interval_secs = 60\n\n[asr]\nmode = \"realtime\"\n"
        )
        .unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.watcher.watch_dirs.len(), 1);
        assert_eq!(config.watcher.scan_interval_secs, 60);
        assert_eq!(config.asr.mode, crate::config::AsrMode::Realtime);
        // Untouched sections keep their defaults.
        assert_eq!(config.translate.batch_lines, 10);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/subwatch.toml")));
        assert!(result.is_err());
    }
}
