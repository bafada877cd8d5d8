//! HTML template rendering for the consent flow
//!
//! Provides template rendering using minijinja with full Jinja2 syntax support
//! including loops, conditionals, filters, etc.

use crate::{AstralError, Result};
use minijinja::Environment;
use std::collections::HashMap;
use std::sync::Arc;

/// Template renderer for HTML pages using minijinja
#[derive(Clone)]
pub struct TemplateRenderer {
    env: Arc<Environment<'static>>,
    templates: HashMap<String, String>,
}

impl TemplateRenderer {
    /// Create a new template renderer with minijinja
    pub fn new() -> Self {
        let mut env = Environment::new();
        // Auto-escape HTML
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::Html);

        Self {
            env: Arc::new(env),
            templates: HashMap::new(),
        }
    }

    /// Renderer with the OAuth pages loaded
    pub fn with_oauth_templates() -> Self {
        let mut renderer = Self::new();
        renderer.load_oauth_templates();
        renderer
    }

    /// Load all OAuth templates (embedded in binary)
    pub fn load_oauth_templates(&mut self) {
        self.templates.insert(
            "consent".to_string(),
            include_str!("../../static/oauth/consent.html").to_string(),
        );
        self.templates.insert(
            "login".to_string(),
            include_str!("../../static/oauth/login.html").to_string(),
        );
        self.templates.insert(
            "error".to_string(),
            include_str!("../../static/oauth/error.html").to_string(),
        );
    }

    /// Render a template with JSON data (minijinja-powered)
    pub fn render_json(&self, name: &str, data: &serde_json::Value) -> Result<String> {
        let template_content = self
            .templates
            .get(name)
            .ok_or_else(|| AstralError::config(format!("Template '{}' not found", name)))?;

        Ok(self.env.render_str(template_content, data)?)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}
