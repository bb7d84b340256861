use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::client::ClientConfig;
use crate::util::strip_quotes;

/// Public popler API endpoint used when nothing else is configured.
pub const DEFAULT_URL: &str = "https://popler.lternet.edu/api";

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_config(url: Option<String>, verify: Option<bool>) -> Result<ClientConfig> {
    let mut url = url.or_else(|| std::env::var("POPLER_URL").ok());
    let mut verify = verify.or_else(|| {
        std::env::var("POPLER_VERIFY")
            .ok()
            .map(|v| parse_bool(&v))
    });

    if url.is_none() || verify.is_none() {
        for rc_path in &rc_candidates() {
            if rc_path.exists() {
                let cfg = read_rc(rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;
                tracing::debug!(path = %rc_path.display(), "using configuration file");

                if url.is_none() {
                    url = cfg.url;
                }
                if verify.is_none() {
                    verify = cfg.verify;
                }
                break;
            }
        }
    }

    Ok(ClientConfig {
        url: url.unwrap_or_else(|| DEFAULT_URL.to_string()),
        verify: verify.unwrap_or(true),
    })
}

fn parse_bool(v: &str) -> bool {
    !matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // Support formatting where `url:` is on one line and the value is on the next line.
    let mut pending_url = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if pending_url {
            pending_url = false;
            if !line.contains(": ") && !line.ends_with(':') {
                cfg.url = Some(strip_quotes(line).to_string());
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let v = strip_quotes(v.trim());
            match k.trim() {
                "url" => {
                    if v.is_empty() {
                        pending_url = true;
                    } else {
                        cfg.url = Some(v.to_string());
                    }
                }
                "verify" => {
                    if !v.is_empty() {
                        cfg.verify = Some(parse_bool(v));
                    }
                }
                _ => {}
            }
        }
    }

    cfg
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) POPLER_RC (explicit)
    // 2) ./.poplerrc
    // 3) ~/.poplerrc
    if let Ok(p) = std::env::var("POPLER_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".poplerrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".poplerrc"));
    }
    v
}
