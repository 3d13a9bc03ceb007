//! Docstrings and their section parsers.
//!
//! A [`Docstring`] stores the raw text plus a parser selection; sections are
//! computed on demand by [`Docstring::parse`]. The Google and Sphinx styles
//! are parsed structurally; the Numpy style currently falls back to a single
//! text section.

use serde_json::{json, Value};

// ============================================================================
// Styles
// ============================================================================

/// Docstring parser selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocstringStyle {
    Google,
    Numpy,
    Sphinx,
    /// Sniff Google markers first, then Sphinx fields, else plain text.
    Auto,
}

impl DocstringStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocstringStyle::Google => "google",
            DocstringStyle::Numpy => "numpy",
            DocstringStyle::Sphinx => "sphinx",
            DocstringStyle::Auto => "auto",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "google" => Some(DocstringStyle::Google),
            "numpy" => Some(DocstringStyle::Numpy),
            "sphinx" => Some(DocstringStyle::Sphinx),
            "auto" => Some(DocstringStyle::Auto),
            _ => None,
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Section kinds of a parsed docstring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocstringSectionKind {
    Text,
    Parameters,
    OtherParameters,
    TypeParameters,
    Raises,
    Warns,
    Returns,
    Yields,
    Receives,
    Examples,
    Attributes,
    Functions,
    Classes,
    Modules,
    TypeAliases,
    Deprecated,
    Admonition,
}

impl DocstringSectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocstringSectionKind::Text => "text",
            DocstringSectionKind::Parameters => "parameters",
            DocstringSectionKind::OtherParameters => "other_parameters",
            DocstringSectionKind::TypeParameters => "type_parameters",
            DocstringSectionKind::Raises => "raises",
            DocstringSectionKind::Warns => "warns",
            DocstringSectionKind::Returns => "returns",
            DocstringSectionKind::Yields => "yields",
            DocstringSectionKind::Receives => "receives",
            DocstringSectionKind::Examples => "examples",
            DocstringSectionKind::Attributes => "attributes",
            DocstringSectionKind::Functions => "functions",
            DocstringSectionKind::Classes => "classes",
            DocstringSectionKind::Modules => "modules",
            DocstringSectionKind::TypeAliases => "type_aliases",
            DocstringSectionKind::Deprecated => "deprecated",
            DocstringSectionKind::Admonition => "admonition",
        }
    }
}

/// One named element of a section (`name (annotation): description`).
#[derive(Debug, Clone, PartialEq)]
pub struct DocstringElement {
    pub name: Option<String>,
    pub annotation: Option<String>,
    pub description: String,
}

/// The value carried by a section; its shape depends on the kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DocstringSectionValue {
    Text(String),
    Elements(Vec<DocstringElement>),
    Admonition { kind: String, text: String },
    Deprecated { version: Option<String>, text: String },
}

/// A parsed docstring section.
#[derive(Debug, Clone, PartialEq)]
pub struct DocstringSection {
    pub kind: DocstringSectionKind,
    pub value: DocstringSectionValue,
}

impl DocstringSection {
    pub fn text(text: impl Into<String>) -> Self {
        DocstringSection {
            kind: DocstringSectionKind::Text,
            value: DocstringSectionValue::Text(text.into()),
        }
    }

    /// JSON form: `{"kind": ..., "value": ...}`.
    pub fn to_json(&self) -> Value {
        let value = match &self.value {
            DocstringSectionValue::Text(text) => json!(text),
            DocstringSectionValue::Elements(elements) => Value::Array(
                elements
                    .iter()
                    .map(|element| {
                        let mut object = serde_json::Map::new();
                        if let Some(name) = &element.name {
                            object.insert("name".to_string(), json!(name));
                        }
                        if let Some(annotation) = &element.annotation {
                            object.insert("annotation".to_string(), json!(annotation));
                        }
                        object.insert("description".to_string(), json!(element.description));
                        Value::Object(object)
                    })
                    .collect(),
            ),
            DocstringSectionValue::Admonition { kind, text } => {
                json!({"kind": kind, "text": text})
            }
            DocstringSectionValue::Deprecated { version, text } => match version {
                Some(version) => json!({"version": version, "text": text}),
                None => json!({"text": text}),
            },
        };
        json!({"kind": self.kind.as_str(), "value": value})
    }
}

// ============================================================================
// Docstring
// ============================================================================

/// A raw docstring plus parser selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Docstring {
    pub value: String,
    pub lineno: Option<usize>,
    pub endlineno: Option<usize>,
    pub style: Option<DocstringStyle>,
}

impl Docstring {
    pub fn new(value: impl Into<String>) -> Self {
        Docstring {
            value: value.into(),
            lineno: None,
            endlineno: None,
            style: None,
        }
    }

    /// Parse into sections. An explicit `style` overrides the stored one;
    /// with neither, the auto sniffer decides.
    pub fn parse(&self, style: Option<DocstringStyle>) -> Vec<DocstringSection> {
        let style = style.or(self.style).unwrap_or(DocstringStyle::Auto);
        let style = match style {
            DocstringStyle::Auto => sniff_style(&self.value),
            other => other,
        };
        match style {
            DocstringStyle::Google => parse_google(&self.value),
            DocstringStyle::Sphinx => parse_sphinx(&self.value),
            // Numpy parsing is not structured yet; degrade to text.
            DocstringStyle::Numpy | DocstringStyle::Auto => {
                vec![DocstringSection::text(self.value.trim())]
            }
        }
    }
}

fn sniff_style(text: &str) -> DocstringStyle {
    for line in text.lines() {
        if google_header(line.trim()).is_some() {
            return DocstringStyle::Google;
        }
    }
    if text
        .lines()
        .any(|line| line.trim_start().starts_with(":param") || line.trim_start().starts_with(":return"))
    {
        return DocstringStyle::Sphinx;
    }
    DocstringStyle::Auto
}

// ============================================================================
// Google style
// ============================================================================

enum GoogleSection {
    Elements(DocstringSectionKind),
    Text(DocstringSectionKind),
    Admonition(&'static str),
    Deprecated,
}

fn google_header(line: &str) -> Option<GoogleSection> {
    let header = line.strip_suffix(':')?;
    use DocstringSectionKind::*;
    let section = match header {
        "Args" | "Arguments" | "Params" | "Parameters" => GoogleSection::Elements(Parameters),
        "Keyword Args" | "Keyword Arguments" | "Other Args" | "Other Arguments"
        | "Other Parameters" => GoogleSection::Elements(OtherParameters),
        "Type Params" | "Type Parameters" => GoogleSection::Elements(TypeParameters),
        "Raises" | "Exceptions" => GoogleSection::Elements(Raises),
        "Warns" | "Warnings" => GoogleSection::Elements(Warns),
        "Returns" => GoogleSection::Elements(Returns),
        "Yields" => GoogleSection::Elements(Yields),
        "Receives" => GoogleSection::Elements(Receives),
        "Attributes" => GoogleSection::Elements(Attributes),
        "Functions" | "Methods" => GoogleSection::Elements(Functions),
        "Classes" => GoogleSection::Elements(Classes),
        "Modules" => GoogleSection::Elements(Modules),
        "Type Aliases" => GoogleSection::Elements(TypeAliases),
        "Examples" | "Example" => GoogleSection::Text(Examples),
        "Deprecated" => GoogleSection::Deprecated,
        "Note" | "Notes" => GoogleSection::Admonition("note"),
        "Warning" => GoogleSection::Admonition("warning"),
        "Tip" => GoogleSection::Admonition("tip"),
        "Important" => GoogleSection::Admonition("important"),
        "Danger" => GoogleSection::Admonition("danger"),
        "Caution" => GoogleSection::Admonition("caution"),
        _ => return None,
    };
    Some(section)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| indent_of(line))
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| {
            if line.len() >= indent {
                &line[indent..]
            } else {
                line.trim_start()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

/// Parse `name (annotation): description` items from a dedented block.
fn parse_elements(block: &str) -> Vec<DocstringElement> {
    let mut elements: Vec<DocstringElement> = Vec::new();
    let lines: Vec<&str> = block.lines().collect();
    let item_indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| indent_of(line))
        .min()
        .unwrap_or(0);
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) > item_indent {
            // Continuation of the previous description.
            if let Some(last) = elements.last_mut() {
                if !last.description.is_empty() {
                    last.description.push(' ');
                }
                last.description.push_str(line.trim());
            }
            continue;
        }
        let line = line.trim();
        match line.split_once(':') {
            Some((head, description)) => {
                let head = head.trim();
                let (name, annotation) = match head.split_once('(') {
                    Some((name, annotation)) => (
                        name.trim().to_string(),
                        Some(annotation.trim_end_matches(')').trim().to_string()),
                    ),
                    None => (head.to_string(), None),
                };
                elements.push(DocstringElement {
                    name: if name.is_empty() { None } else { Some(name) },
                    annotation,
                    description: description.trim().to_string(),
                });
            }
            None => {
                // A bare line: description-only element (common in Returns).
                elements.push(DocstringElement {
                    name: None,
                    annotation: None,
                    description: line.to_string(),
                });
            }
        }
    }
    elements
}

fn parse_google(text: &str) -> Vec<DocstringSection> {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Vec::new();
    let mut free_text: Vec<&str> = Vec::new();
    let mut index = 0;

    let mut flush_text = |free_text: &mut Vec<&str>, sections: &mut Vec<DocstringSection>| {
        let text = dedent(free_text);
        let text = text.trim();
        if !text.is_empty() {
            sections.push(DocstringSection::text(text));
        }
        free_text.clear();
    };

    while index < lines.len() {
        let line = lines[index];
        if let Some(section) = google_header(line.trim()) {
            let header_indent = indent_of(line);
            // Collect the indented block following the header.
            let mut block: Vec<&str> = Vec::new();
            let mut next = index + 1;
            while next < lines.len() {
                let candidate = lines[next];
                if candidate.trim().is_empty() {
                    block.push(candidate);
                    next += 1;
                    continue;
                }
                if indent_of(candidate) <= header_indent {
                    break;
                }
                block.push(candidate);
                next += 1;
            }
            if block.iter().all(|line| line.trim().is_empty()) {
                // A lone "Returns:" line with no body is just text.
                free_text.push(line);
                index += 1;
                continue;
            }
            flush_text(&mut free_text, &mut sections);
            let dedented = dedent(&block);
            match section {
                GoogleSection::Elements(kind) => sections.push(DocstringSection {
                    kind,
                    value: DocstringSectionValue::Elements(parse_elements(&dedented)),
                }),
                GoogleSection::Text(kind) => sections.push(DocstringSection {
                    kind,
                    value: DocstringSectionValue::Text(dedented),
                }),
                GoogleSection::Admonition(kind) => sections.push(DocstringSection {
                    kind: DocstringSectionKind::Admonition,
                    value: DocstringSectionValue::Admonition {
                        kind: kind.to_string(),
                        text: dedented,
                    },
                }),
                GoogleSection::Deprecated => {
                    let (version, text) = match dedented.split_once(':') {
                        Some((head, tail))
                            if !head.trim().is_empty()
                                && head.trim().chars().all(|ch| {
                                    ch.is_ascii_digit() || ch == '.' || ch == 'v'
                                }) =>
                        {
                            (Some(head.trim().to_string()), tail.trim().to_string())
                        }
                        _ => (None, dedented.clone()),
                    };
                    sections.push(DocstringSection {
                        kind: DocstringSectionKind::Deprecated,
                        value: DocstringSectionValue::Deprecated { version, text },
                    });
                }
            }
            index = next;
        } else {
            free_text.push(line);
            index += 1;
        }
    }
    flush_text(&mut free_text, &mut sections);
    sections
}

// ============================================================================
// Sphinx style
// ============================================================================

fn parse_sphinx(text: &str) -> Vec<DocstringSection> {
    let mut parameters: Vec<DocstringElement> = Vec::new();
    let mut returns: Vec<DocstringElement> = Vec::new();
    let mut raises: Vec<DocstringElement> = Vec::new();
    let mut attributes: Vec<DocstringElement> = Vec::new();
    let mut free_text: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(':') {
            let Some((field, description)) = rest.split_once(':') else {
                free_text.push(line.to_string());
                continue;
            };
            let description = description.trim().to_string();
            let mut words = field.split_whitespace();
            match words.next() {
                Some("param") | Some("parameter") | Some("arg") | Some("argument") => {
                    // `:param str name: desc` carries an inline annotation.
                    let tokens: Vec<&str> = words.collect();
                    let (annotation, name) = match tokens.len() {
                        0 => (None, String::new()),
                        1 => (None, tokens[0].to_string()),
                        _ => (
                            Some(tokens[..tokens.len() - 1].join(" ")),
                            tokens[tokens.len() - 1].to_string(),
                        ),
                    };
                    parameters.push(DocstringElement {
                        name: if name.is_empty() { None } else { Some(name) },
                        annotation,
                        description,
                    });
                }
                Some("type") => {
                    if let Some(name) = words.next() {
                        if let Some(parameter) = parameters
                            .iter_mut()
                            .find(|parameter| parameter.name.as_deref() == Some(name))
                        {
                            parameter.annotation = Some(description);
                        }
                    }
                }
                Some("returns") | Some("return") => returns.push(DocstringElement {
                    name: None,
                    annotation: None,
                    description,
                }),
                Some("rtype") => {
                    if let Some(element) = returns.last_mut() {
                        element.annotation = Some(description);
                    } else {
                        returns.push(DocstringElement {
                            name: None,
                            annotation: Some(description),
                            description: String::new(),
                        });
                    }
                }
                Some("raises") | Some("raise") | Some("except") | Some("exception") => {
                    raises.push(DocstringElement {
                        name: None,
                        annotation: words.next().map(str::to_string),
                        description,
                    });
                }
                Some("var") | Some("ivar") | Some("cvar") => {
                    attributes.push(DocstringElement {
                        name: words.next().map(str::to_string),
                        annotation: None,
                        description,
                    });
                }
                _ => free_text.push(line.to_string()),
            }
        } else {
            free_text.push(line.to_string());
        }
    }

    let mut sections = Vec::new();
    let text = free_text.join("\n");
    let text = text.trim();
    if !text.is_empty() {
        sections.push(DocstringSection::text(text));
    }
    for (kind, elements) in [
        (DocstringSectionKind::Parameters, parameters),
        (DocstringSectionKind::Returns, returns),
        (DocstringSectionKind::Raises, raises),
        (DocstringSectionKind::Attributes, attributes),
    ] {
        if !elements.is_empty() {
            sections.push(DocstringSection {
                kind,
                value: DocstringSectionValue::Elements(elements),
            });
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    mod google {
        use super::*;

        #[test]
        fn args_and_returns() {
            let docstring = Docstring::new(
                "Do a thing.\n\nArgs:\n    x (int): The input.\n    y: Another.\n\nReturns:\n    bool: Whether it worked.\n",
            );
            let sections = docstring.parse(Some(DocstringStyle::Google));
            assert_eq!(sections.len(), 3);
            assert_eq!(sections[0].kind, DocstringSectionKind::Text);
            assert_eq!(sections[1].kind, DocstringSectionKind::Parameters);
            let DocstringSectionValue::Elements(elements) = &sections[1].value else {
                panic!("expected elements");
            };
            assert_eq!(elements.len(), 2);
            assert_eq!(elements[0].name.as_deref(), Some("x"));
            assert_eq!(elements[0].annotation.as_deref(), Some("int"));
            assert_eq!(elements[0].description, "The input.");
            assert_eq!(elements[1].annotation, None);
            assert_eq!(sections[2].kind, DocstringSectionKind::Returns);
        }

        #[test]
        fn continuation_lines_join_descriptions() {
            let docstring = Docstring::new(
                "Args:\n    x (int): First line\n        second line.\n",
            );
            let sections = docstring.parse(Some(DocstringStyle::Google));
            let DocstringSectionValue::Elements(elements) = &sections[0].value else {
                panic!("expected elements");
            };
            assert_eq!(elements[0].description, "First line second line.");
        }

        #[test]
        fn admonition_and_deprecated() {
            let docstring = Docstring::new(
                "Summary.\n\nNote:\n    Careful here.\n\nDeprecated:\n    1.2: Use other() instead.\n",
            );
            let sections = docstring.parse(Some(DocstringStyle::Google));
            assert_eq!(sections[1].kind, DocstringSectionKind::Admonition);
            assert_eq!(
                sections[1].value,
                DocstringSectionValue::Admonition {
                    kind: "note".to_string(),
                    text: "Careful here.".to_string(),
                },
            );
            assert_eq!(sections[2].kind, DocstringSectionKind::Deprecated);
            assert_eq!(
                sections[2].value,
                DocstringSectionValue::Deprecated {
                    version: Some("1.2".to_string()),
                    text: "Use other() instead.".to_string(),
                },
            );
        }

        #[test]
        fn plain_text_only() {
            let docstring = Docstring::new("Just some text.\nMore text.");
            let sections = docstring.parse(Some(DocstringStyle::Google));
            assert_eq!(sections.len(), 1);
            assert_eq!(
                sections[0].value,
                DocstringSectionValue::Text("Just some text.\nMore text.".to_string()),
            );
        }
    }

    mod sphinx {
        use super::*;

        #[test]
        fn params_and_returns() {
            let docstring = Docstring::new(
                "Summary.\n\n:param int x: The input.\n:param y: Another.\n:type y: str\n:returns: The result.\n:rtype: bool\n",
            );
            let sections = docstring.parse(Some(DocstringStyle::Sphinx));
            assert_eq!(sections[0].kind, DocstringSectionKind::Text);
            let DocstringSectionValue::Elements(parameters) = &sections[1].value else {
                panic!("expected elements");
            };
            assert_eq!(parameters[0].name.as_deref(), Some("x"));
            assert_eq!(parameters[0].annotation.as_deref(), Some("int"));
            assert_eq!(parameters[1].annotation.as_deref(), Some("str"));
            let DocstringSectionValue::Elements(returns) = &sections[2].value else {
                panic!("expected elements");
            };
            assert_eq!(returns[0].description, "The result.");
            assert_eq!(returns[0].annotation.as_deref(), Some("bool"));
        }
    }

    mod auto {
        use super::*;

        #[test]
        fn sniffs_google() {
            let docstring = Docstring::new("Args:\n    x: input.\n");
            let sections = docstring.parse(None);
            assert_eq!(sections[0].kind, DocstringSectionKind::Parameters);
        }

        #[test]
        fn sniffs_sphinx() {
            let docstring = Docstring::new(":param x: input.\n");
            let sections = docstring.parse(None);
            assert_eq!(sections[0].kind, DocstringSectionKind::Parameters);
        }

        #[test]
        fn falls_back_to_text() {
            let docstring = Docstring::new("Nothing structured here.");
            let sections = docstring.parse(None);
            assert_eq!(sections.len(), 1);
            assert_eq!(sections[0].kind, DocstringSectionKind::Text);
        }
    }

    #[test]
    fn section_json_shapes() {
        let section = DocstringSection {
            kind: DocstringSectionKind::Parameters,
            value: DocstringSectionValue::Elements(vec![DocstringElement {
                name: Some("x".to_string()),
                annotation: Some("int".to_string()),
                description: "The input.".to_string(),
            }]),
        };
        let json = section.to_json();
        assert_eq!(json["kind"], "parameters");
        assert_eq!(json["value"][0]["name"], "x");
        assert_eq!(json["value"][0]["annotation"], "int");
    }
}
