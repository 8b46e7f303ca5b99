//! Minimal asynchronous HTML renderer for component trees.
//!
//! Waits for deferred values and lazy placeholders, invokes server
//! components, and renders suspense regions as their children or, when the
//! children reject, as their fallback.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Number;

use crate::error::FlightError;
use crate::types::{CHILDREN_PROP, Element, ElementKind, Marker, Props, Value};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const SKIPPED_PROPS: &[&str] = &[CHILDREN_PROP, "key", "ref"];

pub async fn render_to_string(value: &Value) -> Result<String, FlightError> {
    let mut html = String::new();
    render_value(value, &mut html).await?;
    Ok(html)
}

fn render_value<'a>(value: &'a Value, out: &'a mut String) -> BoxFuture<'a, Result<(), FlightError>> {
    async move {
        match value {
            Value::Null | Value::Bool(_) => {}
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::String(s) => out.push_str(&escape_html(s)),
            Value::Array(items) => {
                for item in items {
                    render_value(item, out).await?;
                }
            }
            Value::Element(element) => render_element(element, out).await?,
            Value::Deferred(deferred) => {
                let settled = deferred.settle().await.map_err(FlightError::Rejected)?;
                render_value(&settled, out).await?;
            }
            Value::ServerReference(_) | Value::ServerAction(_) => {}
            Value::Object(_) | Value::Symbol(_) => {
                return Err(FlightError::invalid_node(format!(
                    "a {} is not a valid child",
                    value.type_name()
                )));
            }
        }
        Ok(())
    }
    .boxed()
}

async fn render_element(element: &Element, out: &mut String) -> Result<(), FlightError> {
    match &element.kind {
        ElementKind::Intrinsic(tag) => render_html_element(tag, &element.props, out).await,
        ElementKind::Marker(Marker::Suspense) => render_suspense(&element.props, out).await,
        ElementKind::Marker(_) => render_children(&element.props, out).await,
        ElementKind::Component(component) => {
            let output = component.invoke(&element.props).map_err(FlightError::Rejected)?;
            render_value(&output, out).await
        }
        ElementKind::Lazy(deferred) => {
            let settled = deferred.settle().await.map_err(FlightError::Rejected)?;
            render_value(&settled, out).await
        }
        ElementKind::Client(reference) => Err(FlightError::invalid_node(format!(
            "client reference {}#{} was not resolved",
            reference.id, reference.name
        ))),
    }
}

async fn render_children(props: &Props, out: &mut String) -> Result<(), FlightError> {
    match props.get(CHILDREN_PROP) {
        Some(children) => render_value(children, out).await,
        None => Ok(()),
    }
}

/// Renders the children into a scratch buffer so a rejection can be replaced
/// by the fallback.
async fn render_suspense(props: &Props, out: &mut String) -> Result<(), FlightError> {
    let mut content = String::new();
    match render_children(props, &mut content).await {
        Ok(()) => {
            out.push_str("<!--$-->");
            out.push_str(&content);
        }
        Err(FlightError::Rejected(rejection)) => {
            tracing::debug!("Suspense children rejected, rendering fallback: {}", rejection);
            out.push_str("<!--$!-->");
            if let Some(fallback) = props.get("fallback") {
                render_value(fallback, out).await?;
            }
        }
        Err(other) => return Err(other),
    }
    out.push_str("<!--/$-->");
    Ok(())
}

async fn render_html_element(tag: &str, props: &Props, out: &mut String) -> Result<(), FlightError> {
    out.push('<');
    out.push_str(tag);

    for (key, value) in props {
        if SKIPPED_PROPS.contains(&key.as_str()) {
            continue;
        }

        let attr_name = match key.as_str() {
            "className" => "class",
            "htmlFor" => "for",
            _ => key.as_str(),
        };

        match value {
            Value::Object(style) if key == "style" => {
                out.push_str(&format!(" style=\"{}\"", escape_attribute(&serialize_style_object(style))));
            }
            Value::Bool(true) => {
                out.push(' ');
                out.push_str(attr_name);
            }
            Value::String(s) => {
                out.push_str(&format!(" {}=\"{}\"", attr_name, escape_attribute(s)));
            }
            Value::Number(n) => {
                out.push_str(&format!(" {}=\"{}\"", attr_name, n));
            }
            _ => {}
        }
    }

    if VOID_ELEMENTS.contains(&tag) {
        out.push_str("/>");
        return Ok(());
    }

    out.push('>');
    render_children(props, out).await?;
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
    Ok(())
}

fn serialize_style_object(style: &Props) -> String {
    let parts: Vec<String> = style
        .iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => format_number(n),
                _ => return None,
            };
            Some(format!("{}:{}", kebab_case(name), value))
        })
        .collect();
    parts.join(";")
}

fn kebab_case(name: &str) -> String {
    name.chars().fold(String::with_capacity(name.len()), |mut acc, c| {
        if c.is_uppercase() {
            acc.push('-');
            acc.extend(c.to_lowercase());
        } else {
            acc.push(c);
        }
        acc
    })
}

fn format_number(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.is_finite() => {
            format!("{:.10}", f).trim_end_matches('0').trim_end_matches('.').to_string()
        }
        _ => n.to_string(),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_attribute(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
