//! Renders resolved endpoints through the user's Tera template.
//!
//! The template is parsed on every render, so edits take effect on the
//! next cycle.  Templates see one variable, `hosts`, mapping each routing
//! key to its endpoints:
//!
//! ```text
//! {% for host, containers in hosts %}
//! upstream {{ replace(s=host, old=".", new="_") }} {
//!   {% for c in containers %}server {{ c.address }}:{{ c.port }};{% endfor %}
//! }
//! {% endfor %}
//! ```

use std::collections::HashMap;
use std::error::Error as _;
use std::path::Path;

use log::info;
use tera::{Context, Tera, Value};
use tokio::io::AsyncWriteExt;

use crate::error::RenderError;
use crate::types::{group_by_host, Endpoint};

const TEMPLATE_NAME: &str = "config";

fn string_arg(args: &HashMap<String, Value>, func: &str, name: &str) -> tera::Result<String> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(tera::Error::msg(format!(
            "`{}`: argument `{}` must be a string, got {}",
            func, name, other
        ))),
        None => Err(tera::Error::msg(format!(
            "`{}`: missing argument `{}`",
            func, name
        ))),
    }
}

/// Optional count argument; negative or absent means "no limit".
fn count_arg(args: &HashMap<String, Value>, func: &str) -> tera::Result<Option<usize>> {
    match args.get("n") {
        None => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(n) if n < 0 => Ok(None),
            Some(n) => Ok(Some(n as usize)),
            None => Err(tera::Error::msg(format!("`{}`: `n` must be an integer", func))),
        },
        Some(other) => Err(tera::Error::msg(format!(
            "`{}`: `n` must be an integer, got {}",
            func, other
        ))),
    }
}

/// `replace(s, old, new, n)`; `n` limits the number of replacements.
fn replace(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = string_arg(args, "replace", "s")?;
    let old = string_arg(args, "replace", "old")?;
    let new = string_arg(args, "replace", "new")?;
    let replaced = match count_arg(args, "replace")? {
        Some(n) => s.replacen(&old, &new, n),
        None => s.replace(&old, &new),
    };
    Ok(Value::String(replaced))
}

/// `split(s, sep)`
fn split(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = string_arg(args, "split", "s")?;
    let sep = string_arg(args, "split", "sep")?;
    Ok(Value::Array(
        s.split(sep.as_str()).map(|p| Value::String(p.into())).collect(),
    ))
}

/// `split_n(s, sep, n)`: at most `n` parts, the last one holding the rest.
fn split_n(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = string_arg(args, "split_n", "s")?;
    let sep = string_arg(args, "split_n", "sep")?;
    let parts: Vec<Value> = match count_arg(args, "split_n")? {
        Some(0) => Vec::new(),
        Some(n) => s.splitn(n, sep.as_str()).map(|p| Value::String(p.into())).collect(),
        None => s.split(sep.as_str()).map(|p| Value::String(p.into())).collect(),
    };
    Ok(Value::Array(parts))
}

fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn build_tera(template_path: &Path, source: &str) -> Result<Tera, RenderError> {
    let mut tera = Tera::default();
    tera.register_function("replace", replace);
    tera.register_function("split", split);
    tera.register_function("split_n", split_n);
    tera.add_raw_template(TEMPLATE_NAME, source)
        .map_err(|e| RenderError::Template {
            path: template_path.to_path_buf(),
            message: describe(&e),
        })?;
    Ok(tera)
}

/// Render the template at `template_path` against `endpoints` into a
/// string without touching any output file.
pub async fn render_to_string(
    endpoints: &[Endpoint],
    template_path: &Path,
) -> Result<String, RenderError> {
    let source = tokio::fs::read_to_string(template_path)
        .await
        .map_err(|e| RenderError::Template {
            path: template_path.to_path_buf(),
            message: e.to_string(),
        })?;
    let tera = build_tera(template_path, &source)?;

    let mut context = Context::new();
    context.insert("hosts", &group_by_host(endpoints));

    tera.render(TEMPLATE_NAME, &context)
        .map_err(|e| RenderError::Template {
            path: template_path.to_path_buf(),
            message: describe(&e),
        })
}

/// Render and replace the contents of `output_path`.
///
/// The whole output is produced before the file is opened, so template
/// errors leave the previous file intact.  The write itself truncates in
/// place.
pub async fn render(
    endpoints: &[Endpoint],
    template_path: &Path,
    output_path: &Path,
) -> Result<(), RenderError> {
    let rendered = render_to_string(endpoints, template_path).await?;

    let io_err = |source: std::io::Error| RenderError::Io {
        path: output_path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(output_path).await.map_err(io_err)?;
    file.write_all(rendered.as_bytes()).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;

    info!(
        "wrote {} ({} bytes, {} endpoints)",
        output_path.display(),
        rendered.len(),
        endpoints.len()
    );
    Ok(())
}
