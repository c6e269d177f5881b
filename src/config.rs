use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use crate::request::{self, Placeholder};

/// Crawler configuration, read from YAML.
///
/// ```yaml
/// feed_request: |
///   GET /activity?until=0 HTTP/1.1
///   Host: app.example.test
///   Accept-Encoding: gzip
/// detail_request: |
///   :method: GET
///   :scheme: https
///   :authority: app.example.test
///   :path: /api/v3/stories/0
///   accept-encoding: gzip
/// output_dir: stories
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Raw activity page request; must contain `until=<digits>`.
    pub feed_request: String,
    /// Raw story request; must contain `stories/<digits>`.
    pub detail_request: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("stories")
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects templates that lack their placeholder or do not parse.
    fn validate(&self) -> anyhow::Result<()> {
        check_template("feed_request", &self.feed_request, Placeholder::Cursor)?;
        check_template("detail_request", &self.detail_request, Placeholder::StoryId)?;
        Ok(())
    }
}

fn check_template(field: &str, template: &str, placeholder: Placeholder) -> anyhow::Result<()> {
    if !placeholder.is_present(template) {
        anyhow::bail!("{field}: template has no {placeholder:?} placeholder");
    }
    request::parse(template, None).with_context(|| format!("{field}: parse template"))?;
    Ok(())
}
