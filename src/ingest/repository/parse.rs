use std::fs;
use std::path::Path;

use tree_sitter::{Language as TsLanguage, Node, Parser as TsParser};

use super::{MethodDoc, SourceLanguage, TypeDoc};
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
}

impl Grammar {
    fn for_file(language: SourceLanguage, path: &Path) -> Self {
        let is_tsx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("tsx"))
            .unwrap_or(false);

        match language {
            SourceLanguage::Python => Grammar::Python,
            SourceLanguage::JavaScript => Grammar::JavaScript,
            SourceLanguage::TypeScript if is_tsx => Grammar::Tsx,
            SourceLanguage::TypeScript => Grammar::TypeScript,
        }
    }

    fn tree_sitter_language(self) -> TsLanguage {
        match self {
            Grammar::Python => tree_sitter_python::LANGUAGE.into(),
            Grammar::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    fn class_kinds(self) -> &'static [&'static str] {
        match self {
            Grammar::Python => &["class_definition"],
            Grammar::JavaScript => &["class_declaration", "class"],
            Grammar::TypeScript | Grammar::Tsx => {
                &["class_declaration", "abstract_class_declaration", "class"]
            }
        }
    }
}

/// Read and parse one source file.
pub fn parse_file(path: &Path, language: SourceLanguage) -> Result<Vec<TypeDoc>, PipelineError> {
    let content = fs::read_to_string(path).map_err(|err| PipelineError::ParseFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    extract_types(&content, Grammar::for_file(language, path)).map_err(|reason| {
        PipelineError::ParseFailed {
            path: path.to_path_buf(),
            reason,
        }
    })
}

/// Parse `content` and extract every class definition, nested ones included,
/// in source order. Sources containing syntax errors are rejected.
fn extract_types(content: &str, grammar: Grammar) -> Result<Vec<TypeDoc>, String> {
    let mut parser = TsParser::new();
    parser
        .set_language(&grammar.tree_sitter_language())
        .map_err(|err| format!("failed to set tree-sitter language: {err}"))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| "parser produced no tree".to_string())?;
    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(0) + 1;
        return Err(format!("syntax error near line {line}"));
    }

    let kinds = grammar.class_kinds();
    let mut classes = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if kinds.contains(&node.kind()) {
            classes.push(node);
        }
        stack.extend(named_children(node));
    }
    classes.sort_by_key(|node| node.start_byte());

    let src = content.as_bytes();
    Ok(classes
        .into_iter()
        .filter_map(|node| match grammar {
            Grammar::Python => python_type(node, src),
            _ => script_type(node, src),
        })
        .collect())
}

fn first_error_line(root: Node) -> Option<usize> {
    let mut stack = vec![root];
    let mut best: Option<usize> = None;
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let row = node.start_position().row;
            best = Some(best.map_or(row, |b| b.min(row)));
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }
    best
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn text(node: Node, src: &[u8]) -> String {
    node.utf8_text(src).unwrap_or_default().trim().to_string()
}

// ---- Python ----------------------------------------------------------------

fn python_type(node: Node, src: &[u8]) -> Option<TypeDoc> {
    let name = text(node.child_by_field_name("name")?, src);

    let bases = node
        .child_by_field_name("superclasses")
        .map(|list| {
            named_children(list)
                .into_iter()
                .filter(|arg| !matches!(arg.kind(), "keyword_argument" | "comment"))
                .map(|arg| text(unsplat(arg), src))
                .collect()
        })
        .unwrap_or_default();

    let body = node.child_by_field_name("body");
    let methods = body
        .map(|block| {
            named_children(block)
                .into_iter()
                .filter_map(|stmt| match stmt.kind() {
                    "function_definition" => Some(stmt),
                    "decorated_definition" => stmt
                        .child_by_field_name("definition")
                        .filter(|def| def.kind() == "function_definition"),
                    _ => None,
                })
                .filter_map(|func| python_method(func, src))
                .collect()
        })
        .unwrap_or_default();

    Some(TypeDoc {
        name,
        bases,
        doc: body.and_then(|block| python_docstring(block, src)),
        methods,
    })
}

fn python_method(func: Node, src: &[u8]) -> Option<MethodDoc> {
    let name = text(func.child_by_field_name("name")?, src);
    let params = func
        .child_by_field_name("parameters")
        .map(|params| {
            named_children(params)
                .into_iter()
                .filter_map(|param| python_param_name(param, src))
                .collect()
        })
        .unwrap_or_default();
    let doc = func
        .child_by_field_name("body")
        .and_then(|block| python_docstring(block, src));

    Some(MethodDoc { name, params, doc })
}

fn python_param_name(param: Node, src: &[u8]) -> Option<String> {
    match param.kind() {
        "positional_separator" | "keyword_separator" | "comment" => None,
        "default_parameter" | "typed_default_parameter" => {
            param.child_by_field_name("name").map(|n| text(n, src))
        }
        "typed_parameter" => param.named_child(0).map(|n| text(unsplat(n), src)),
        _ => Some(text(unsplat(param), src)),
    }
}

/// `*args`, `**kwargs` and `*bases` name the identifier under the sigil.
fn unsplat(node: Node) -> Node {
    match node.kind() {
        "list_splat_pattern" | "dictionary_splat_pattern" | "list_splat" | "dictionary_splat" => {
            node.named_child(0).unwrap_or(node)
        }
        _ => node,
    }
}

/// Docstring of a class or function body: a string literal as its first statement.
fn python_docstring(block: Node, src: &[u8]) -> Option<String> {
    let first = named_children(block)
        .into_iter()
        .find(|stmt| stmt.kind() != "comment")?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let literal = first.named_child(0)?;
    let inner = match literal.kind() {
        "string" => string_body(literal, src)?,
        // Adjacent literals ("a" "b") form one docstring.
        "concatenated_string" => named_children(literal)
            .into_iter()
            .filter(|part| part.kind() == "string")
            .map(|part| string_body(part, src))
            .collect::<Option<Vec<_>>>()?
            .concat(),
        _ => return None,
    };

    clean_doc(&inner)
}

/// Contents of a plain Python string literal, without prefix or quotes.
fn string_body(literal: Node, src: &[u8]) -> Option<String> {
    let raw = literal.utf8_text(src).ok()?;

    let prefix_len = raw.find(['"', '\'']).unwrap_or(0);
    let prefix = raw[..prefix_len].to_ascii_lowercase();
    // f-strings and bytes are expressions, not docstrings.
    if prefix.contains('f') || prefix.contains('b') {
        return None;
    }

    let quoted = &raw[prefix_len..];
    let inner = ["\"\"\"", "'''", "\"", "'"].iter().find_map(|quote| {
        let end = quoted.len().checked_sub(quote.len())?;
        (quoted.starts_with(quote) && quoted.ends_with(quote) && end >= quote.len())
            .then(|| &quoted[quote.len()..end])
    })?;

    Some(inner.to_string())
}

/// Dedent a docstring the way Python's `inspect.cleandoc` does.
fn clean_doc(raw: &str) -> Option<String> {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    let (first, rest) = lines.split_first()?;

    let margin = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned = vec![first.trim_start().to_string()];
    cleaned.extend(rest.iter().map(|line| {
        line.get(margin..)
            .unwrap_or_else(|| line.trim_start())
            .trim_end()
            .to_string()
    }));

    let joined = cleaned.join("\n");
    let trimmed = joined.trim_matches('\n').trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ---- JavaScript / TypeScript -------------------------------------------------

fn script_type(node: Node, src: &[u8]) -> Option<TypeDoc> {
    // Anonymous class expressions have nothing to list.
    let name = text(node.child_by_field_name("name")?, src);

    let bases = named_children(node)
        .into_iter()
        .find(|child| child.kind() == "class_heritage")
        .map(|heritage| heritage_bases(heritage, src))
        .unwrap_or_default();

    let methods = node
        .child_by_field_name("body")
        .map(|body| {
            named_children(body)
                .into_iter()
                .filter(|member| member.kind() == "method_definition")
                .filter_map(|member| script_method(member, src))
                .collect()
        })
        .unwrap_or_default();

    // `export class Foo` carries its comment on the export statement.
    let anchor = match node.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => node,
    };

    Some(TypeDoc {
        name,
        bases,
        doc: leading_jsdoc(anchor, src),
        methods,
    })
}

fn heritage_bases(heritage: Node, src: &[u8]) -> Vec<String> {
    let mut bases = Vec::new();
    for clause in named_children(heritage) {
        match clause.kind() {
            "extends_clause" => {
                let mut cursor = clause.walk();
                let values: Vec<Node> = clause.children_by_field_name("value", &mut cursor).collect();
                if values.is_empty() {
                    bases.extend(
                        named_children(clause)
                            .into_iter()
                            .filter(|n| n.kind() != "type_arguments")
                            .map(|n| text(n, src)),
                    );
                } else {
                    bases.extend(values.into_iter().map(|n| text(n, src)));
                }
            }
            "implements_clause" => {
                bases.extend(named_children(clause).into_iter().map(|n| text(n, src)));
            }
            "comment" => {}
            _ => bases.push(text(clause, src)),
        }
    }
    bases
}

fn script_method(member: Node, src: &[u8]) -> Option<MethodDoc> {
    let name = text(member.child_by_field_name("name")?, src);
    let params = member
        .child_by_field_name("parameters")
        .map(|params| {
            named_children(params)
                .into_iter()
                .filter_map(|param| script_param_name(param, src))
                .collect()
        })
        .unwrap_or_default();

    Some(MethodDoc {
        name,
        params,
        doc: leading_jsdoc(member, src),
    })
}

fn script_param_name(param: Node, src: &[u8]) -> Option<String> {
    match param.kind() {
        "comment" => None,
        "assignment_pattern" => param.child_by_field_name("left").map(|n| text(n, src)),
        "required_parameter" | "optional_parameter" => param
            .child_by_field_name("pattern")
            .map(|n| text(n, src)),
        _ => Some(text(param, src)),
    }
}

fn leading_jsdoc(node: Node, src: &[u8]) -> Option<String> {
    let comment = node.prev_named_sibling().filter(|n| n.kind() == "comment")?;
    let raw = comment.utf8_text(src).ok()?;
    let body = raw.strip_prefix("/**")?.strip_suffix("*/")?;

    let lines: Vec<&str> = body
        .lines()
        .map(|line| {
            let line = line.trim();
            let line = line.strip_prefix('*').unwrap_or(line);
            line.strip_prefix(' ').unwrap_or(line).trim_end()
        })
        .collect();
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python(content: &str) -> Vec<TypeDoc> {
        extract_types(content, Grammar::Python).expect("parse python")
    }

    #[test]
    fn python_classes_methods_and_docstrings() {
        let types = python(
            r#"
import abc

class Shape(abc.ABC, metaclass=abc.ABCMeta):
    """A drawable shape.

    Subclasses implement area.
    """

    @abc.abstractmethod
    def area(self):
        """Return the area."""

    def scale(self, factor: float, *args, origin=(0, 0), **kwargs):
        pass

    class Meta:
        pass


def helper():
    class Local(Shape):
        pass
"#,
        );

        let names: Vec<_> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Shape", "Meta", "Local"]);

        let shape = &types[0];
        assert_eq!(shape.bases, ["abc.ABC"]);
        assert_eq!(
            shape.doc.as_deref(),
            Some("A drawable shape.\n\nSubclasses implement area.")
        );

        let methods: Vec<_> = shape.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, ["area", "scale"]);
        assert_eq!(shape.methods[0].params, ["self"]);
        assert_eq!(shape.methods[0].doc.as_deref(), Some("Return the area."));
        assert_eq!(
            shape.methods[1].params,
            ["self", "factor", "args", "origin", "kwargs"]
        );
        assert!(shape.methods[1].doc.is_none());

        assert_eq!(types[2].bases, ["Shape"]);
        assert!(types[1].methods.is_empty());
    }

    #[test]
    fn python_non_docstring_first_statement() {
        let types = python("class A:\n    x = 'not a doc'\n    def f(self, /, a, *, b): ...\n");
        assert!(types[0].doc.is_none());
        assert_eq!(types[0].methods[0].params, ["self", "a", "b"]);
    }

    #[test]
    fn python_splats_and_concatenated_docstrings() {
        let types = python(
            "class C(B, *mixins):\n    \"Joined \" \"docstring.\"\n    def f(self, *args: int, x, **kw):\n        pass\n",
        );
        assert_eq!(types[0].bases, ["B", "mixins"]);
        assert_eq!(types[0].doc.as_deref(), Some("Joined docstring."));
        assert_eq!(types[0].methods[0].params, ["self", "args", "x", "kw"]);
    }

    #[test]
    fn python_syntax_errors_are_rejected() {
        let err = extract_types("class Broken(:\n    pass\n", Grammar::Python).expect_err("error");
        assert!(err.contains("syntax error"));
    }

    #[test]
    fn javascript_classes_with_jsdoc() {
        let content = r#"
/**
 * A widget.
 * Renders things.
 */
export class Widget extends Base {
  /** Draw it. */
  render(ctx, scale = 1, ...rest) {}

  update() {}
}
"#;
        let types = extract_types(content, Grammar::JavaScript).expect("parse js");
        assert_eq!(types.len(), 1);
        let widget = &types[0];
        assert_eq!(widget.name, "Widget");
        assert_eq!(widget.bases, ["Base"]);
        assert_eq!(widget.doc.as_deref(), Some("A widget.\nRenders things."));
        assert_eq!(widget.methods[0].params, ["ctx", "scale", "...rest"]);
        assert_eq!(widget.methods[0].doc.as_deref(), Some("Draw it."));
        assert!(widget.methods[1].doc.is_none());
    }

    #[test]
    fn typescript_heritage_and_parameters() {
        let content = r#"
class Repo<T> extends Store<T> implements Readable, Writable {
  constructor(private readonly url: string, depth?: number) { super(); }
  fetch(id: string = "x"): T { return null as any; }
}
"#;
        let types = extract_types(content, Grammar::TypeScript).expect("parse ts");
        let repo = &types[0];
        assert_eq!(repo.name, "Repo");
        assert_eq!(repo.bases, ["Store", "Readable", "Writable"]);
        assert_eq!(repo.methods[0].name, "constructor");
        assert_eq!(repo.methods[0].params, ["url", "depth"]);
        assert_eq!(repo.methods[1].params, ["id"]);
    }
}
