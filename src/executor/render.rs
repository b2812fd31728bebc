//! Turning a change file into the SQL that actually runs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{Result, ShiftError};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder regex"));

/// Produces final SQL from a file's source text.
pub trait SqlRenderer {
    fn render(&self, path: &Path, source: &str) -> Result<String>;
}

/// Values available to templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub config: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
}

/// Passes `.sql` through and substitutes `{{ ns.KEY }}` in `.sql.tmpl`.
///
/// Namespaces are `config`, `secrets` and `env` (process environment).
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    context: RenderContext,
}

impl TemplateRenderer {
    #[must_use]
    pub const fn new(context: RenderContext) -> Self {
        Self { context }
    }

    fn lookup(&self, expr: &str) -> Option<String> {
        let (namespace, key) = expr.split_once('.')?;
        match namespace {
            "config" => self.context.config.get(key).cloned(),
            "secrets" => self.context.secrets.get(key).cloned(),
            "env" => std::env::var(key).ok(),
            _ => None,
        }
    }
}

impl SqlRenderer for TemplateRenderer {
    fn render(&self, path: &Path, source: &str) -> Result<String> {
        let is_template = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tmpl"));
        if !is_template {
            return Ok(source.to_string());
        }

        let mut missing = None;
        let rendered = PLACEHOLDER.replace_all(source, |caps: &Captures<'_>| {
            let expr = &caps[1];
            self.lookup(expr).unwrap_or_else(|| {
                missing.get_or_insert_with(|| expr.to_string());
                String::new()
            })
        });

        match missing {
            Some(expr) => Err(ShiftError::Render {
                path: path.to_path_buf(),
                reason: format!("unknown placeholder '{{{{ {expr} }}}}'"),
            }),
            None => Ok(rendered.into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> TemplateRenderer {
        let mut context = RenderContext::default();
        context.config.insert("schema".into(), "app".into());
        context.secrets.insert("password".into(), "s3cret".into());
        TemplateRenderer::new(context)
    }

    #[test]
    fn plain_sql_is_verbatim() {
        let sql = "select '{{ config.schema }}';";
        let out = renderer().render(Path::new("001_a.sql"), sql).unwrap();
        assert_eq!(out, sql);
    }

    #[test]
    fn template_substitutes_namespaces() {
        let out = renderer()
            .render(
                Path::new("001_a.sql.tmpl"),
                "create user x identified by '{{secrets.password}}' in {{ config.schema }};",
            )
            .unwrap();
        assert_eq!(out, "create user x identified by 's3cret' in app;");
    }

    #[test]
    fn env_namespace_reads_process_env() {
        let out = renderer()
            .render(Path::new("001_a.sql.tmpl"), "-- {{ env.PATH }}")
            .unwrap();
        assert!(!out.contains("{{"));
    }

    #[test]
    fn unknown_placeholder_fails() {
        let err = renderer()
            .render(Path::new("001_a.sql.tmpl"), "select {{ config.nope }}, {{ other }};")
            .unwrap_err();
        match err {
            ShiftError::Render { reason, .. } => assert!(reason.contains("config.nope")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
