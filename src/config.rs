#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_RELAY_PORT: u16 = 8080;
pub const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
pub const DEFAULT_BRAND_ID: u32 = 2;

/// Everything the relay server and the catalog front end need at runtime.
///
/// `api_base` and `api_key` are allowed to be empty: the catalog client then
/// builds requests the upstream cannot answer and serves sample data instead.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub api_base: String,
    pub api_key: String,
    pub brand_id: u32,
    pub relay_host: String,
    pub relay_port: u16,
    pub relay_url: String,
    pub www_root: Option<PathBuf>,
}

pub fn load_runtime_settings() -> Result<RuntimeSettings> {
    resolve_runtime_settings(RuntimeOverrides::default())
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub relay_host: Option<String>,
    pub relay_port: Option<u16>,
    pub relay_url: Option<String>,
    pub www_root: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeSettings {
    build_runtime_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let api_base = non_blank(overrides.api_base)
        .or_else(|| lookup_value("CATALOG_API_BASE", file_vars, &env_lookup))
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_default();
    let api_key = non_blank(overrides.api_key)
        .or_else(|| lookup_value("CATALOG_API_KEY", file_vars, &env_lookup))
        .unwrap_or_default();
    let brand_id = lookup_value("CATALOG_BRAND_ID", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(DEFAULT_BRAND_ID);
    let relay_port = overrides
        .relay_port
        .or_else(|| {
            lookup_value("RELAY_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_RELAY_PORT);
    let relay_host = non_blank(overrides.relay_host)
        .or_else(|| lookup_value("RELAY_HOST", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_RELAY_HOST.to_string());
    let relay_url = non_blank(overrides.relay_url)
        .or_else(|| lookup_value("RELAY_URL", file_vars, &env_lookup))
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("http://{relay_host}:{relay_port}"));
    let www_root = overrides.www_root.or_else(|| {
        lookup_value("WWW_ROOT", file_vars, &env_lookup).map(PathBuf::from)
    });

    RuntimeSettings {
        api_base,
        api_key,
        brand_id,
        relay_host,
        relay_port,
        relay_url,
        www_root,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> RuntimeSettings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_runtime_settings(&vars, |_| None)
    }

    #[test]
    fn missing_values_use_defaults() {
        let settings = settings_from("");
        assert_eq!(settings.api_base, "");
        assert_eq!(settings.api_key, "");
        assert_eq!(settings.brand_id, DEFAULT_BRAND_ID);
        assert_eq!(settings.relay_port, DEFAULT_RELAY_PORT);
        assert_eq!(settings.relay_host, DEFAULT_RELAY_HOST);
        assert_eq!(settings.relay_url, "http://127.0.0.1:8080");
        assert!(settings.www_root.is_none());
    }

    #[test]
    fn reads_upstream_values_and_strips_trailing_slash() {
        let settings = settings_from(
            "CATALOG_API_BASE=\"https://api.example.test/v1/\"\nCATALOG_API_KEY=\"k3y\"\nCATALOG_BRAND_ID=7\n",
        );
        assert_eq!(settings.api_base, "https://api.example.test/v1");
        assert_eq!(settings.api_key, "k3y");
        assert_eq!(settings.brand_id, 7);
    }

    #[test]
    fn relay_url_follows_host_and_port() {
        let settings = settings_from("RELAY_HOST=\"0.0.0.0\"\nRELAY_PORT=\"4242\"\n");
        assert_eq!(settings.relay_port, 4242);
        assert_eq!(settings.relay_url, "http://0.0.0.0:4242");
    }

    #[test]
    fn explicit_relay_url_wins() {
        let settings = settings_from("RELAY_URL=\"http://relay.test:9000/\"\n");
        assert_eq!(settings.relay_url, "http://relay.test:9000");
    }

    #[test]
    fn prefers_env_over_file() {
        let vars = read_env_file(make_config("CATALOG_API_KEY=\"file\"\n").path()).unwrap();
        let settings = build_runtime_settings(&vars, |key| {
            if key == "CATALOG_API_KEY" {
                Some("env".to_string())
            } else {
                None
            }
        });
        assert_eq!(settings.api_key, "env");
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export CATALOG_API_BASE="https://api.test"
            CATALOG_API_KEY='secret'
            RELAY_HOST =  "0.0.0.0"
            RELAY_PORT=9090
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("CATALOG_API_BASE").unwrap(), "https://api.test");
        assert_eq!(vars.get("CATALOG_API_KEY").unwrap(), "secret");
        assert_eq!(vars.get("RELAY_HOST").unwrap(), "0.0.0.0");
        assert_eq!(vars.get("RELAY_PORT").unwrap(), "9090");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn override_precedence() {
        let mut vars = HashMap::new();
        vars.insert("CATALOG_API_BASE".to_string(), "https://file".to_string());
        vars.insert("RELAY_HOST".to_string(), "file-host".to_string());
        vars.insert("RELAY_PORT".to_string(), "7000".to_string());
        vars.insert("WWW_ROOT".to_string(), "/file-www".to_string());

        let overrides = RuntimeOverrides {
            api_base: Some("https://override".into()),
            relay_port: Some(9000),
            relay_host: Some("override-host".into()),
            ..RuntimeOverrides::default()
        };

        let settings = build_runtime_settings_with_overrides(
            &vars,
            |key| {
                if key == "RELAY_PORT" {
                    Some("8000".to_string())
                } else {
                    None
                }
            },
            overrides,
        );

        assert_eq!(settings.api_base, "https://override");
        assert_eq!(settings.relay_port, 9000);
        assert_eq!(settings.relay_host, "override-host");
        assert_eq!(settings.www_root, Some(PathBuf::from("/file-www")));
    }

    #[test]
    fn blank_override_is_ignored() {
        let settings = build_runtime_settings_with_overrides(
            &HashMap::new(),
            |_| None,
            RuntimeOverrides {
                relay_host: Some("   ".into()),
                ..RuntimeOverrides::default()
            },
        );
        assert_eq!(settings.relay_host, DEFAULT_RELAY_HOST);
    }

    #[test]
    fn invalid_port_defaults() {
        let settings = settings_from("RELAY_PORT=\"nope\"\n");
        assert_eq!(settings.relay_port, DEFAULT_RELAY_PORT);
    }
}
