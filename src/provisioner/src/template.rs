//! Shell template manager.
//!
//! Step bodies are tera templates compiled into the binary; a filesystem
//! loader exists for local development. `run_template` renders a template
//! with a projection of the config and hands the script to a runner as one
//! command.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::RwLock;
use tera::Tera;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::embedded;
use crate::runner::{ExecResult, Runner};

struct Registry {
    tera: Tera,
    sources: HashMap<String, String>,
}

impl Registry {
    fn rebuild(&mut self) -> Result<()> {
        let mut tera = Tera::default();
        for (name, body) in &self.sources {
            tera.add_raw_template(name, body)
                .map_err(|err| Error::Internal(format!("template {}: {}", name, err)))?;
        }
        self.tera = tera;
        Ok(())
    }
}

pub struct TemplateManager {
    registry: RwLock<Registry>,
}

impl TemplateManager {
    fn from_sources(sources: HashMap<String, String>) -> Result<Self> {
        let mut registry = Registry {
            tera: Tera::default(),
            sources,
        };
        registry.rebuild()?;
        Ok(TemplateManager {
            registry: RwLock::new(registry),
        })
    }

    /// Load the templates compiled into the binary.
    pub fn from_embedded() -> Result<Self> {
        let sources = embedded::ALL_TEMPLATES
            .iter()
            .map(|(name, body)| (name.to_string(), body.to_string()))
            .collect::<HashMap<_, _>>();
        tracing::debug!(
            "[TemplateManager] loading {} embedded templates",
            sources.len()
        );
        Self::from_sources(sources)
    }

    /// Load `*.sh` templates from a directory, keyed by file stem.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut sources = HashMap::new();
        for entry in std::fs::read_dir(dir)
            .map_err(|err| Error::Internal(format!("read {}: {}", dir.display(), err)))?
        {
            let path = entry
                .map_err(|err| Error::Internal(format!("read {}: {}", dir.display(), err)))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("sh") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from)
            else {
                continue;
            };
            let body = std::fs::read_to_string(&path)
                .map_err(|err| Error::Internal(format!("read {}: {}", path.display(), err)))?;
            sources.insert(name, body);
        }
        tracing::debug!(
            "[TemplateManager] loaded {} templates from {}",
            sources.len(),
            dir.display()
        );
        Self::from_sources(sources)
    }

    /// Check that a template is registered.
    pub fn get(&self, name: &str) -> Result<()> {
        let registry = self
            .registry
            .read()
            .map_err(|_| Error::Internal("template lock poisoned".to_string()))?;
        if registry.sources.contains_key(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("template {}", name)))
        }
    }

    pub fn render(&self, name: &str, context: &tera::Context) -> Result<String> {
        let registry = self
            .registry
            .read()
            .map_err(|_| Error::Internal("template lock poisoned".to_string()))?;
        if !registry.sources.contains_key(name) {
            return Err(Error::NotFound(format!("template {}", name)));
        }
        registry
            .tera
            .render(name, context)
            .map_err(|err| Error::Internal(format!("render {}: {}", name, err)))
    }

    /// Replace a template body. Test hook.
    pub fn set(&self, name: &str, body: &str) -> Result<()> {
        let mut registry = self
            .registry
            .write()
            .map_err(|_| Error::Internal("template lock poisoned".to_string()))?;
        registry.sources.insert(name.to_string(), body.to_string());
        registry.rebuild()
    }

    /// Drop a template. Test hook.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut registry = self
            .registry
            .write()
            .map_err(|_| Error::Internal("template lock poisoned".to_string()))?;
        registry.sources.remove(name);
        registry.rebuild()
    }
}

/// Render a template with the given data and execute it through a runner,
/// streaming captured output to the task sink. A non-zero exit surfaces as
/// the step's error.
pub async fn run_template(
    ctx: &CancellationToken,
    manager: &TemplateManager,
    name: &str,
    runner: &dyn Runner,
    out: &mut (dyn Write + Send),
    data: &serde_json::Value,
) -> Result<ExecResult> {
    let context = tera::Context::from_serialize(data)
        .map_err(|err| Error::Internal(format!("template context {}: {}", name, err)))?;
    let script = manager.render(name, &context)?;

    let result = runner.run(ctx, &script).await?;
    if !result.stdout.is_empty() {
        let _ = out.write_all(result.stdout.as_bytes());
    }
    if !result.stderr.is_empty() {
        let _ = out.write_all(result.stderr.as_bytes());
    }

    if !result.success() {
        return Err(Error::Internal(format!(
            "{} exited with status {}: {}",
            name,
            result.exit_code,
            result.stderr_tail()
        )));
    }
    Ok(result)
}
