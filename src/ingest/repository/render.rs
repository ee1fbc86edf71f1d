use super::{MethodDoc, RepositoryDoc, TypeDoc};

const NO_DOC_PLACEHOLDER: &str = "_No documentation available._";

/// Render the extracted definitions as a single markdown document:
/// title, source URL, table of contents, then one section per file.
pub fn render_markdown(doc: &RepositoryDoc) -> String {
    let mut lines = vec![
        format!("# {} Documentation", doc.name),
        String::new(),
        format!("Source: {}", doc.url),
        String::new(),
        "## Table of Contents".to_string(),
        String::new(),
    ];

    if doc.files.is_empty() {
        lines.push("_No type definitions found._".to_string());
    }
    for (path, types) in &doc.files {
        lines.push(format!("- [{}](#{})", path, anchor(path)));
        for ty in types {
            lines.push(format!("  - {}", ty.name));
        }
    }

    for (path, types) in &doc.files {
        lines.push(String::new());
        lines.push(format!("## {path}"));
        for ty in types {
            render_type(&mut lines, ty);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render_type(lines: &mut Vec<String>, ty: &TypeDoc) {
    lines.push(String::new());
    lines.push(format!("### class {}", ty.name));

    if !ty.bases.is_empty() {
        lines.push(String::new());
        lines.push(format!("**Inherits from:** {}", ty.bases.join(", ")));
    }
    if let Some(doc) = &ty.doc {
        lines.push(String::new());
        lines.push(doc.clone());
    }

    if ty.methods.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push("#### Methods".to_string());
    for method in &ty.methods {
        render_method(lines, method);
    }
}

fn render_method(lines: &mut Vec<String>, method: &MethodDoc) {
    lines.push(String::new());
    lines.push(format!("##### `{}({})`", method.name, method.params.join(", ")));
    lines.push(String::new());
    lines.push(
        method
            .doc
            .clone()
            .unwrap_or_else(|| NO_DOC_PLACEHOLDER.to_string()),
    );
}

/// GitHub-style heading anchor.
fn anchor(heading: &str) -> String {
    heading
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}
