//! Template expansion and decoding of embedded manifests

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::{Environment, ErrorKind, UndefinedBehavior, Value};
use serde::Serialize;

use super::registry::KindRegistry;
use super::Manifest;
use crate::resource::ResourceObject;
use crate::{Error, Result};

/// Base64 encode filter over strings or bytes
///
/// Usage: `{{ serving_ca | base64 }}`
fn base64_filter(value: Value) -> std::result::Result<String, minijinja::Error> {
    value.as_bytes().map(|b| STANDARD.encode(b)).ok_or_else(|| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 expects a string or bytes, got {}", value.kind()),
        )
    })
}

/// Expands manifests against a set of values and decodes the result.
///
/// Rendering is stateless: the only shared state is the immutable
/// [`KindRegistry`] supplied at construction.
pub struct ManifestRenderer {
    env: Environment<'static>,
    registry: KindRegistry,
}

impl ManifestRenderer {
    /// Renderer over the embedded catalog that decodes through `registry`
    pub fn new(registry: KindRegistry) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("base64", base64_filter);
        Self { env, registry }
    }

    /// Expand the template text only
    pub fn expand<S: Serialize>(&self, manifest: &Manifest, values: &S) -> Result<String> {
        self.env
            .render_named_str(manifest.id, manifest.template, values)
            .map_err(|e| Error::manifest(manifest.id, format!("{:#}", e)))
    }

    /// Expand and decode one manifest
    pub fn render<S: Serialize>(&self, manifest: &Manifest, values: &S) -> Result<ResourceObject> {
        let text = self.expand(manifest, values)?;
        let doc: serde_json::Value = serde_yaml::from_str(&text)
            .map_err(|e| Error::manifest(manifest.id, format!("rendered YAML is invalid: {}", e)))?;
        self.registry
            .decode(doc)
            .map_err(|e| Error::manifest(manifest.id, e.to_string()))
    }

    /// Expand and decode a manifest set, preserving its order
    pub fn render_all<S: Serialize>(
        &self,
        manifests: &[Manifest],
        values: &S,
    ) -> Result<Vec<ResourceObject>> {
        manifests.iter().map(|m| self.render(m, values)).collect()
    }
}
