//! Expression trees for annotations, default values, and decorators.
//!
//! Expressions preserve source-level identifier scoping: every [`Expr::Name`]
//! carries a handle to the object it was written under, so the name can be
//! re-resolved after the whole package is loaded. Rendering is
//! precedence-aware and inserts parentheses only where the grammar requires
//! them.
//!
//! Construction has a raising form ([`parse_expr`]) and a non-raising form
//! ([`safe_parse_expr`]) that logs and returns `None`. A tree is never
//! partially built.

use std::fmt;

use rustpython_parser::ast;
use rustpython_parser::Mode;
use tracing::warn;

use crate::collection::{ModulesCollection, ObjectId};
use crate::error::{GriffeError, Result};
use crate::object::ParameterKind;

// ============================================================================
// Operator kinds
// ============================================================================

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

impl BinOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mult => "*",
            BinOpKind::MatMult => "@",
            BinOpKind::Div => "/",
            BinOpKind::Mod => "%",
            BinOpKind::Pow => "**",
            BinOpKind::LShift => "<<",
            BinOpKind::RShift => ">>",
            BinOpKind::BitOr => "|",
            BinOpKind::BitXor => "^",
            BinOpKind::BitAnd => "&",
            BinOpKind::FloorDiv => "//",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinOpKind::BitOr => P_BITOR,
            BinOpKind::BitXor => P_BITXOR,
            BinOpKind::BitAnd => P_BITAND,
            BinOpKind::LShift | BinOpKind::RShift => P_SHIFT,
            BinOpKind::Add | BinOpKind::Sub => P_ADD,
            BinOpKind::Mult
            | BinOpKind::MatMult
            | BinOpKind::Div
            | BinOpKind::Mod
            | BinOpKind::FloorDiv => P_MUL,
            BinOpKind::Pow => P_POW,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Invert,
    UAdd,
    USub,
}

impl UnaryOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOpKind::Not => "not ",
            UnaryOpKind::Invert => "~",
            UnaryOpKind::UAdd => "+",
            UnaryOpKind::USub => "-",
        }
    }
}

/// Boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

impl BoolOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoolOpKind::And => "and",
            BoolOpKind::Or => "or",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOpKind {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOpKind::Eq => "==",
            CmpOpKind::NotEq => "!=",
            CmpOpKind::Lt => "<",
            CmpOpKind::LtE => "<=",
            CmpOpKind::Gt => ">",
            CmpOpKind::GtE => ">=",
            CmpOpKind::Is => "is",
            CmpOpKind::IsNot => "is not",
            CmpOpKind::In => "in",
            CmpOpKind::NotIn => "not in",
        }
    }
}

/// Comprehension flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    List,
    Set,
    Dict,
    Generator,
}

/// One `for ... in ... [if ...]` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    pub target: Expr,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
    pub is_async: bool,
}

/// A lambda parameter (no annotations in the grammar).
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub default: Option<Box<Expr>>,
}

// ============================================================================
// Precedence table
// ============================================================================

// Low to high, following the Python expression grammar. Atoms are highest.
const P_YIELD: u8 = 0;
const P_NAMED: u8 = 1;
const P_LAMBDA: u8 = 2;
const P_TERNARY: u8 = 3;
const P_OR: u8 = 4;
const P_AND: u8 = 5;
const P_NOT: u8 = 6;
const P_COMPARE: u8 = 7;
const P_BITOR: u8 = 8;
const P_BITXOR: u8 = 9;
const P_BITAND: u8 = 10;
const P_SHIFT: u8 = 11;
const P_ADD: u8 = 12;
const P_MUL: u8 = 13;
const P_UNARY: u8 = 14;
const P_POW: u8 = 15;
const P_AWAIT: u8 = 16;
const P_ATOM: u8 = 17;

// Minimum precedence for expressions in comma-separated positions (call
// arguments, slice parts): a bare walrus would be ambiguous there.
const P_ITEM: u8 = P_LAMBDA;

// ============================================================================
// Expr
// ============================================================================

/// A typed expression tree.
///
/// Literals are stored in source form; identifiers carry the scope they were
/// written in so that [`Expr::name_path`] can re-resolve them later.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal constant in source form (`"'text'"`, `"1"`, `"None"`).
    Constant { value: String },
    /// An identifier plus the object it must be resolved against.
    Name {
        ident: String,
        scope: Option<ObjectId>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Expr>,
    },
    Tuple {
        elements: Vec<Expr>,
        /// Implicit tuples (subscript slices) render without parentheses.
        implicit: bool,
    },
    List {
        elements: Vec<Expr>,
    },
    Set {
        elements: Vec<Expr>,
    },
    Dict {
        /// A `None` key is a `**mapping` unpacking.
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Comprehension {
        kind: ComprehensionKind,
        element: Box<Expr>,
        /// Dict comprehensions carry the value; `element` is then the key.
        value: Option<Box<Expr>>,
        generators: Vec<Generator>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOpKind,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOpKind>,
        comparators: Vec<Expr>,
    },
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    /// A named argument inside a call.
    Keyword {
        name: String,
        value: Box<Expr>,
    },
    /// A `*args` marker in calls and tuples.
    VarPositional {
        value: Box<Expr>,
    },
    /// A `**kwargs` marker in calls.
    VarKeyword {
        value: Box<Expr>,
    },
    Lambda {
        parameters: Vec<LambdaParameter>,
        body: Box<Expr>,
    },
    /// Conditional expression `body if test else orelse`.
    IfElse {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// Named expression `target := value`.
    Named {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Yield {
        value: Option<Box<Expr>>,
    },
    YieldFrom {
        value: Box<Expr>,
    },
    Await {
        value: Box<Expr>,
    },
    /// An f-string; values alternate raw text constants and formatted values.
    FString {
        values: Vec<Expr>,
    },
    FormattedValue {
        value: Box<Expr>,
        conversion: Option<char>,
        format_spec: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Shorthand for an unbound name.
    pub fn name(ident: impl Into<String>) -> Self {
        Expr::Name {
            ident: ident.into(),
            scope: None,
        }
    }

    /// Shorthand for a constant in source form.
    pub fn constant(value: impl Into<String>) -> Self {
        Expr::Constant {
            value: value.into(),
        }
    }

    /// Whether this expression is a literal constant.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant { .. })
    }

    /// The dotted source render of a name or attribute chain, if it is one.
    pub fn dotted(&self) -> Option<String> {
        match self {
            Expr::Name { ident, .. } => Some(ident.clone()),
            Expr::Attribute { value, attr } => Some(format!("{}.{}", value.dotted()?, attr)),
            _ => None,
        }
    }

    /// Resolve a name or attribute chain to the fully qualified path it
    /// binds to at its recorded scope.
    pub fn name_path(&self, collection: &ModulesCollection) -> Result<String> {
        match self {
            Expr::Name { ident, scope } => match scope {
                Some(scope) => collection.resolve(*scope, ident),
                None => Err(GriffeError::name_resolution(ident.clone(), "<unbound>")),
            },
            Expr::Attribute { value, attr } => {
                Ok(format!("{}.{}", value.name_path(collection)?, attr))
            }
            _ => Err(GriffeError::name_resolution(
                self.to_string(),
                "<not a name>",
            )),
        }
    }

    /// Like [`Expr::name_path`], then walked through aliases to the path
    /// where the target was originally defined.
    pub fn canonical_path(&self, collection: &ModulesCollection) -> Result<String> {
        let path = self.name_path(collection)?;
        Ok(collection.canonicalize_path(&path))
    }

    /// The leftmost scope recorded anywhere in this tree.
    pub fn scope(&self) -> Option<ObjectId> {
        let mut found = None;
        self.walk(&mut |expr| {
            if found.is_none() {
                if let Expr::Name {
                    scope: Some(scope), ..
                } = expr
                {
                    found = Some(*scope);
                }
            }
        });
        found
    }

    /// Visit every node of the tree, depth first.
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Constant { .. } | Expr::Name { .. } => {}
            Expr::Attribute { value, .. }
            | Expr::VarPositional { value }
            | Expr::VarKeyword { value }
            | Expr::Keyword { value, .. }
            | Expr::YieldFrom { value }
            | Expr::Await { value } => value.walk(visit),
            Expr::Subscript { value, slice } => {
                value.walk(visit);
                slice.walk(visit);
            }
            Expr::Tuple { elements, .. } | Expr::List { elements } | Expr::Set { elements } => {
                for element in elements {
                    element.walk(visit);
                }
            }
            Expr::Dict { keys, values } => {
                for key in keys.iter().flatten() {
                    key.walk(visit);
                }
                for value in values {
                    value.walk(visit);
                }
            }
            Expr::Comprehension {
                element,
                value,
                generators,
                ..
            } => {
                element.walk(visit);
                if let Some(value) = value {
                    value.walk(visit);
                }
                for generator in generators {
                    generator.target.walk(visit);
                    generator.iter.walk(visit);
                    for condition in &generator.conditions {
                        condition.walk(visit);
                    }
                }
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    part.walk(visit);
                }
            }
            Expr::UnaryOp { operand, .. } => operand.walk(visit),
            Expr::BinOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::BoolOp { values, .. } => {
                for value in values {
                    value.walk(visit);
                }
            }
            Expr::Compare {
                left, comparators, ..
            } => {
                left.walk(visit);
                for comparator in comparators {
                    comparator.walk(visit);
                }
            }
            Expr::Call {
                function,
                arguments,
            } => {
                function.walk(visit);
                for argument in arguments {
                    argument.walk(visit);
                }
            }
            Expr::Lambda { parameters, body } => {
                for parameter in parameters {
                    if let Some(default) = &parameter.default {
                        default.walk(visit);
                    }
                }
                body.walk(visit);
            }
            Expr::IfElse { body, test, orelse } => {
                body.walk(visit);
                test.walk(visit);
                orelse.walk(visit);
            }
            Expr::Named { target, value } => {
                target.walk(visit);
                value.walk(visit);
            }
            Expr::Yield { value } => {
                if let Some(value) = value {
                    value.walk(visit);
                }
            }
            Expr::FString { values } => {
                for value in values {
                    value.walk(visit);
                }
            }
            Expr::FormattedValue {
                value, format_spec, ..
            } => {
                value.walk(visit);
                if let Some(spec) = format_spec {
                    spec.walk(visit);
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Yield { .. } | Expr::YieldFrom { .. } => P_YIELD,
            Expr::Named { .. } => P_NAMED,
            Expr::Keyword { .. } => P_NAMED,
            Expr::Lambda { .. } => P_LAMBDA,
            Expr::IfElse { .. } => P_TERNARY,
            Expr::BoolOp { op, .. } => match op {
                BoolOpKind::Or => P_OR,
                BoolOpKind::And => P_AND,
            },
            Expr::Compare { .. } => P_COMPARE,
            Expr::BinOp { op, .. } => op.precedence(),
            Expr::UnaryOp { op, .. } => match op {
                UnaryOpKind::Not => P_NOT,
                _ => P_UNARY,
            },
            Expr::Await { .. } => P_AWAIT,
            Expr::Slice { .. } => P_ITEM,
            Expr::VarPositional { .. } | Expr::VarKeyword { .. } => P_NAMED,
            Expr::Tuple { implicit, .. } => {
                if *implicit {
                    P_ITEM
                } else {
                    P_ATOM
                }
            }
            _ => P_ATOM,
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

struct Paren<'a>(&'a Expr, u8);

impl fmt::Display for Paren<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.precedence() < self.1 {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn join<T: fmt::Display>(items: impl IntoIterator<Item = T>, separator: &str) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

fn escape_fstring_text(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Render an f-string part without the surrounding `f"..."`.
fn render_fstring_inner(expr: &Expr) -> String {
    match expr {
        Expr::FString { values } => values.iter().map(render_fstring_inner).collect(),
        Expr::Constant { value } => escape_fstring_text(value),
        Expr::FormattedValue {
            value,
            conversion,
            format_spec,
        } => {
            let mut out = format!("{{{}", value);
            if let Some(conversion) = conversion {
                out.push('!');
                out.push(*conversion);
            }
            if let Some(spec) = format_spec {
                out.push(':');
                out.push_str(&render_fstring_inner(spec));
            }
            out.push('}');
            out
        }
        other => format!("{{{}}}", other),
    }
}

fn render_lambda_parameters(parameters: &[LambdaParameter]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut seen_positional_only = false;
    let mut star_emitted = false;
    for (index, parameter) in parameters.iter().enumerate() {
        match parameter.kind {
            ParameterKind::PositionalOnly => {
                seen_positional_only = true;
            }
            ParameterKind::PositionalOrKeyword => {
                if seen_positional_only {
                    parts.push("/".to_string());
                    seen_positional_only = false;
                }
            }
            ParameterKind::VarPositional => {
                if seen_positional_only {
                    parts.push("/".to_string());
                    seen_positional_only = false;
                }
                star_emitted = true;
                parts.push(format!("*{}", parameter.name));
                continue;
            }
            ParameterKind::KeywordOnly => {
                if seen_positional_only {
                    parts.push("/".to_string());
                    seen_positional_only = false;
                }
                if !star_emitted {
                    parts.push("*".to_string());
                    star_emitted = true;
                }
            }
            ParameterKind::VarKeyword => {
                if seen_positional_only {
                    parts.push("/".to_string());
                    seen_positional_only = false;
                }
                parts.push(format!("**{}", parameter.name));
                continue;
            }
        }
        let mut part = parameter.name.clone();
        if let Some(default) = &parameter.default {
            part.push('=');
            part.push_str(&default.to_string());
        }
        parts.push(part);
        // A trailing positional-only group still needs its slash.
        if seen_positional_only
            && index + 1 == parameters.len()
        {
            parts.push("/".to_string());
        }
    }
    parts.join(", ")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value } => write!(f, "{value}"),
            Expr::Name { ident, .. } => write!(f, "{ident}"),
            Expr::Attribute { value, attr } => {
                write!(f, "{}.{attr}", Paren(value, P_ATOM))
            }
            Expr::Subscript { value, slice } => {
                write!(f, "{}[{}]", Paren(value, P_ATOM), slice)
            }
            Expr::Tuple { elements, implicit } => {
                let inner = if elements.len() == 1 {
                    format!("{},", Paren(&elements[0], P_ITEM))
                } else {
                    join(elements.iter().map(|e| Paren(e, P_ITEM)), ", ")
                };
                if *implicit {
                    write!(f, "{inner}")
                } else {
                    write!(f, "({inner})")
                }
            }
            Expr::List { elements } => {
                write!(f, "[{}]", join(elements.iter().map(|e| Paren(e, P_ITEM)), ", "))
            }
            Expr::Set { elements } => {
                write!(f, "{{{}}}", join(elements.iter().map(|e| Paren(e, P_ITEM)), ", "))
            }
            Expr::Dict { keys, values } => {
                let items = keys.iter().zip(values).map(|(key, value)| match key {
                    Some(key) => format!("{}: {}", Paren(key, P_ITEM), Paren(value, P_ITEM)),
                    None => format!("**{}", Paren(value, P_ATOM)),
                });
                write!(f, "{{{}}}", join(items, ", "))
            }
            Expr::Comprehension {
                kind,
                element,
                value,
                generators,
            } => {
                let clauses = join(
                    generators.iter().map(|generator| {
                        let mut clause = format!(
                            "{}for {} in {}",
                            if generator.is_async { "async " } else { "" },
                            generator.target,
                            Paren(&generator.iter, P_OR),
                        );
                        for condition in &generator.conditions {
                            clause.push_str(&format!(" if {}", Paren(condition, P_OR)));
                        }
                        clause
                    }),
                    " ",
                );
                match kind {
                    ComprehensionKind::List => {
                        write!(f, "[{} {clauses}]", Paren(element, P_ITEM))
                    }
                    ComprehensionKind::Set => {
                        write!(f, "{{{} {clauses}}}", Paren(element, P_ITEM))
                    }
                    ComprehensionKind::Dict => write!(
                        f,
                        "{{{}: {} {clauses}}}",
                        Paren(element, P_ITEM),
                        Paren(value.as_deref().unwrap_or(element), P_ITEM),
                    ),
                    ComprehensionKind::Generator => {
                        write!(f, "({} {clauses})", Paren(element, P_ITEM))
                    }
                }
            }
            Expr::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    write!(f, "{}", Paren(lower, P_TERNARY))?;
                }
                write!(f, ":")?;
                if let Some(upper) = upper {
                    write!(f, "{}", Paren(upper, P_TERNARY))?;
                }
                if let Some(step) = step {
                    write!(f, ":{}", Paren(step, P_TERNARY))?;
                }
                Ok(())
            }
            Expr::UnaryOp { op, operand } => {
                let min = match op {
                    UnaryOpKind::Not => P_NOT,
                    _ => P_UNARY,
                };
                write!(f, "{}{}", op.as_str(), Paren(operand, min))
            }
            Expr::BinOp { left, op, right } => {
                let precedence = op.precedence();
                if *op == BinOpKind::Pow {
                    // Right associative, and a unary on the right binds
                    // without parentheses (`a ** -b`).
                    let right_needs_parens =
                        right.precedence() < P_UNARY && !matches!(**right, Expr::UnaryOp { .. });
                    let rendered_right = if right_needs_parens {
                        format!("({right})")
                    } else {
                        right.to_string()
                    };
                    write!(f, "{} ** {rendered_right}", Paren(left, precedence + 1))
                } else {
                    write!(
                        f,
                        "{} {} {}",
                        Paren(left, precedence),
                        op.as_str(),
                        Paren(right, precedence + 1),
                    )
                }
            }
            Expr::BoolOp { op, values } => {
                let precedence = self.precedence();
                let rendered = values
                    .iter()
                    .map(|value| Paren(value, precedence + 1).to_string())
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", op.as_str()));
                write!(f, "{rendered}")
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                write!(f, "{}", Paren(left, P_COMPARE + 1))?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    write!(f, " {} {}", op.as_str(), Paren(comparator, P_COMPARE + 1))?;
                }
                Ok(())
            }
            Expr::Call {
                function,
                arguments,
            } => {
                write!(
                    f,
                    "{}({})",
                    Paren(function, P_ATOM),
                    join(arguments.iter().map(|a| Paren(a, P_ITEM)), ", "),
                )
            }
            Expr::Keyword { name, value } => {
                write!(f, "{name}={}", Paren(value, P_ITEM))
            }
            Expr::VarPositional { value } => write!(f, "*{}", Paren(value, P_ATOM)),
            Expr::VarKeyword { value } => write!(f, "**{}", Paren(value, P_ATOM)),
            Expr::Lambda { parameters, body } => {
                if parameters.is_empty() {
                    write!(f, "lambda: {}", Paren(body, P_LAMBDA))
                } else {
                    write!(
                        f,
                        "lambda {}: {}",
                        render_lambda_parameters(parameters),
                        Paren(body, P_LAMBDA),
                    )
                }
            }
            Expr::IfElse { body, test, orelse } => {
                write!(
                    f,
                    "{} if {} else {}",
                    Paren(body, P_TERNARY + 1),
                    Paren(test, P_TERNARY + 1),
                    Paren(orelse, P_TERNARY),
                )
            }
            Expr::Named { target, value } => {
                write!(f, "{} := {}", Paren(target, P_ATOM), Paren(value, P_NAMED + 1))
            }
            Expr::Yield { value } => match value {
                Some(value) => write!(f, "yield {}", Paren(value, P_NAMED)),
                None => write!(f, "yield"),
            },
            Expr::YieldFrom { value } => write!(f, "yield from {}", Paren(value, P_NAMED)),
            Expr::Await { value } => write!(f, "await {}", Paren(value, P_AWAIT)),
            Expr::FString { values } => {
                let inner: String = values.iter().map(render_fstring_inner).collect();
                write!(f, "f\"{inner}\"")
            }
            Expr::FormattedValue { .. } => write!(f, "{}", render_fstring_inner(self)),
        }
    }
}

// ============================================================================
// Construction from the parser AST
// ============================================================================

fn python_string_repr(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if (ch as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", ch as u32)),
            ch => out.push(ch),
        }
    }
    out.push('\'');
    out
}

fn python_bytes_repr(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("b'");
    for byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            byte if *byte < 0x20 || *byte >= 0x7f => out.push_str(&format!("\\x{byte:02x}")),
            byte => out.push(*byte as char),
        }
    }
    out.push('\'');
    out
}

/// Render a parser constant into Python source form.
pub fn render_constant(constant: &ast::Constant) -> String {
    match constant {
        ast::Constant::None => "None".to_string(),
        ast::Constant::Bool(true) => "True".to_string(),
        ast::Constant::Bool(false) => "False".to_string(),
        ast::Constant::Str(text) => python_string_repr(text),
        ast::Constant::Bytes(bytes) => python_bytes_repr(bytes),
        ast::Constant::Int(value) => value.to_string(),
        ast::Constant::Float(value) => format!("{value:?}"),
        ast::Constant::Complex { real, imag } => {
            if *real == 0.0 {
                format!("{imag:?}j")
            } else {
                format!("({real:?}+{imag:?}j)")
            }
        }
        ast::Constant::Ellipsis => "...".to_string(),
        ast::Constant::Tuple(items) => {
            let rendered: Vec<String> = items.iter().map(render_constant).collect();
            if rendered.len() == 1 {
                format!("({},)", rendered[0])
            } else {
                format!("({})", rendered.join(", "))
            }
        }
    }
}

fn lambda_parameters_from_ast(
    arguments: &ast::Arguments,
    scope: Option<ObjectId>,
) -> Vec<LambdaParameter> {
    let mut parameters = Vec::new();
    for argument in &arguments.posonlyargs {
        parameters.push(LambdaParameter {
            name: argument.def.arg.as_str().to_string(),
            kind: ParameterKind::PositionalOnly,
            default: argument
                .default
                .as_deref()
                .map(|default| Box::new(Expr::from_ast(default, scope))),
        });
    }
    for argument in &arguments.args {
        parameters.push(LambdaParameter {
            name: argument.def.arg.as_str().to_string(),
            kind: ParameterKind::PositionalOrKeyword,
            default: argument
                .default
                .as_deref()
                .map(|default| Box::new(Expr::from_ast(default, scope))),
        });
    }
    if let Some(vararg) = &arguments.vararg {
        parameters.push(LambdaParameter {
            name: vararg.arg.as_str().to_string(),
            kind: ParameterKind::VarPositional,
            default: None,
        });
    }
    for argument in &arguments.kwonlyargs {
        parameters.push(LambdaParameter {
            name: argument.def.arg.as_str().to_string(),
            kind: ParameterKind::KeywordOnly,
            default: argument
                .default
                .as_deref()
                .map(|default| Box::new(Expr::from_ast(default, scope))),
        });
    }
    if let Some(kwarg) = &arguments.kwarg {
        parameters.push(LambdaParameter {
            name: kwarg.arg.as_str().to_string(),
            kind: ParameterKind::VarKeyword,
            default: None,
        });
    }
    parameters
}

impl Expr {
    /// Lower a parser expression into an owned tree bound to `scope`.
    pub fn from_ast(expr: &ast::Expr, scope: Option<ObjectId>) -> Expr {
        match expr {
            ast::Expr::Constant(node) => Expr::Constant {
                value: render_constant(&node.value),
            },
            ast::Expr::Name(node) => Expr::Name {
                ident: node.id.as_str().to_string(),
                scope,
            },
            ast::Expr::Attribute(node) => Expr::Attribute {
                value: Box::new(Expr::from_ast(&node.value, scope)),
                attr: node.attr.as_str().to_string(),
            },
            ast::Expr::Subscript(node) => {
                let slice = match node.slice.as_ref() {
                    ast::Expr::Tuple(tuple) => Expr::Tuple {
                        elements: tuple
                            .elts
                            .iter()
                            .map(|element| Expr::from_ast(element, scope))
                            .collect(),
                        implicit: true,
                    },
                    other => Expr::from_ast(other, scope),
                };
                Expr::Subscript {
                    value: Box::new(Expr::from_ast(&node.value, scope)),
                    slice: Box::new(slice),
                }
            }
            ast::Expr::Tuple(node) => Expr::Tuple {
                elements: node
                    .elts
                    .iter()
                    .map(|element| Expr::from_ast(element, scope))
                    .collect(),
                implicit: false,
            },
            ast::Expr::List(node) => Expr::List {
                elements: node
                    .elts
                    .iter()
                    .map(|element| Expr::from_ast(element, scope))
                    .collect(),
            },
            ast::Expr::Set(node) => Expr::Set {
                elements: node
                    .elts
                    .iter()
                    .map(|element| Expr::from_ast(element, scope))
                    .collect(),
            },
            ast::Expr::Dict(node) => Expr::Dict {
                keys: node
                    .keys
                    .iter()
                    .map(|key| key.as_ref().map(|key| Expr::from_ast(key, scope)))
                    .collect(),
                values: node
                    .values
                    .iter()
                    .map(|value| Expr::from_ast(value, scope))
                    .collect(),
            },
            ast::Expr::ListComp(node) => Expr::Comprehension {
                kind: ComprehensionKind::List,
                element: Box::new(Expr::from_ast(&node.elt, scope)),
                value: None,
                generators: generators_from_ast(&node.generators, scope),
            },
            ast::Expr::SetComp(node) => Expr::Comprehension {
                kind: ComprehensionKind::Set,
                element: Box::new(Expr::from_ast(&node.elt, scope)),
                value: None,
                generators: generators_from_ast(&node.generators, scope),
            },
            ast::Expr::DictComp(node) => Expr::Comprehension {
                kind: ComprehensionKind::Dict,
                element: Box::new(Expr::from_ast(&node.key, scope)),
                value: Some(Box::new(Expr::from_ast(&node.value, scope))),
                generators: generators_from_ast(&node.generators, scope),
            },
            ast::Expr::GeneratorExp(node) => Expr::Comprehension {
                kind: ComprehensionKind::Generator,
                element: Box::new(Expr::from_ast(&node.elt, scope)),
                value: None,
                generators: generators_from_ast(&node.generators, scope),
            },
            ast::Expr::Slice(node) => Expr::Slice {
                lower: node
                    .lower
                    .as_deref()
                    .map(|lower| Box::new(Expr::from_ast(lower, scope))),
                upper: node
                    .upper
                    .as_deref()
                    .map(|upper| Box::new(Expr::from_ast(upper, scope))),
                step: node
                    .step
                    .as_deref()
                    .map(|step| Box::new(Expr::from_ast(step, scope))),
            },
            ast::Expr::UnaryOp(node) => Expr::UnaryOp {
                op: match node.op {
                    ast::UnaryOp::Not => UnaryOpKind::Not,
                    ast::UnaryOp::Invert => UnaryOpKind::Invert,
                    ast::UnaryOp::UAdd => UnaryOpKind::UAdd,
                    ast::UnaryOp::USub => UnaryOpKind::USub,
                },
                operand: Box::new(Expr::from_ast(&node.operand, scope)),
            },
            ast::Expr::BinOp(node) => Expr::BinOp {
                left: Box::new(Expr::from_ast(&node.left, scope)),
                op: binop_from_ast(node.op),
                right: Box::new(Expr::from_ast(&node.right, scope)),
            },
            ast::Expr::BoolOp(node) => Expr::BoolOp {
                op: match node.op {
                    ast::BoolOp::And => BoolOpKind::And,
                    ast::BoolOp::Or => BoolOpKind::Or,
                },
                values: node
                    .values
                    .iter()
                    .map(|value| Expr::from_ast(value, scope))
                    .collect(),
            },
            ast::Expr::Compare(node) => Expr::Compare {
                left: Box::new(Expr::from_ast(&node.left, scope)),
                ops: node.ops.iter().map(|op| cmpop_from_ast(*op)).collect(),
                comparators: node
                    .comparators
                    .iter()
                    .map(|comparator| Expr::from_ast(comparator, scope))
                    .collect(),
            },
            ast::Expr::Call(node) => {
                let mut arguments: Vec<Expr> = node
                    .args
                    .iter()
                    .map(|argument| Expr::from_ast(argument, scope))
                    .collect();
                for keyword in &node.keywords {
                    arguments.push(match &keyword.arg {
                        Some(name) => Expr::Keyword {
                            name: name.as_str().to_string(),
                            value: Box::new(Expr::from_ast(&keyword.value, scope)),
                        },
                        None => Expr::VarKeyword {
                            value: Box::new(Expr::from_ast(&keyword.value, scope)),
                        },
                    });
                }
                Expr::Call {
                    function: Box::new(Expr::from_ast(&node.func, scope)),
                    arguments,
                }
            }
            ast::Expr::Starred(node) => Expr::VarPositional {
                value: Box::new(Expr::from_ast(&node.value, scope)),
            },
            ast::Expr::Lambda(node) => Expr::Lambda {
                parameters: lambda_parameters_from_ast(&node.args, scope),
                body: Box::new(Expr::from_ast(&node.body, scope)),
            },
            ast::Expr::IfExp(node) => Expr::IfElse {
                body: Box::new(Expr::from_ast(&node.body, scope)),
                test: Box::new(Expr::from_ast(&node.test, scope)),
                orelse: Box::new(Expr::from_ast(&node.orelse, scope)),
            },
            ast::Expr::NamedExpr(node) => Expr::Named {
                target: Box::new(Expr::from_ast(&node.target, scope)),
                value: Box::new(Expr::from_ast(&node.value, scope)),
            },
            ast::Expr::Yield(node) => Expr::Yield {
                value: node
                    .value
                    .as_deref()
                    .map(|value| Box::new(Expr::from_ast(value, scope))),
            },
            ast::Expr::YieldFrom(node) => Expr::YieldFrom {
                value: Box::new(Expr::from_ast(&node.value, scope)),
            },
            ast::Expr::Await(node) => Expr::Await {
                value: Box::new(Expr::from_ast(&node.value, scope)),
            },
            ast::Expr::JoinedStr(node) => Expr::FString {
                values: node
                    .values
                    .iter()
                    .map(|value| match value {
                        // Text parts are stored raw, without quotes.
                        ast::Expr::Constant(constant) => match &constant.value {
                            ast::Constant::Str(text) => Expr::Constant {
                                value: text.clone(),
                            },
                            other => Expr::Constant {
                                value: render_constant(other),
                            },
                        },
                        other => Expr::from_ast(other, scope),
                    })
                    .collect(),
            },
            ast::Expr::FormattedValue(node) => Expr::FormattedValue {
                value: Box::new(Expr::from_ast(&node.value, scope)),
                conversion: match node.conversion {
                    ast::ConversionFlag::Str => Some('s'),
                    ast::ConversionFlag::Repr => Some('r'),
                    ast::ConversionFlag::Ascii => Some('a'),
                    ast::ConversionFlag::None => None,
                },
                format_spec: node
                    .format_spec
                    .as_deref()
                    .map(|spec| Box::new(Expr::from_ast(spec, scope))),
            },
        }
    }
}

fn binop_from_ast(op: ast::Operator) -> BinOpKind {
    match op {
        ast::Operator::Add => BinOpKind::Add,
        ast::Operator::Sub => BinOpKind::Sub,
        ast::Operator::Mult => BinOpKind::Mult,
        ast::Operator::MatMult => BinOpKind::MatMult,
        ast::Operator::Div => BinOpKind::Div,
        ast::Operator::Mod => BinOpKind::Mod,
        ast::Operator::Pow => BinOpKind::Pow,
        ast::Operator::LShift => BinOpKind::LShift,
        ast::Operator::RShift => BinOpKind::RShift,
        ast::Operator::BitOr => BinOpKind::BitOr,
        ast::Operator::BitXor => BinOpKind::BitXor,
        ast::Operator::BitAnd => BinOpKind::BitAnd,
        ast::Operator::FloorDiv => BinOpKind::FloorDiv,
    }
}

fn cmpop_from_ast(op: ast::CmpOp) -> CmpOpKind {
    match op {
        ast::CmpOp::Eq => CmpOpKind::Eq,
        ast::CmpOp::NotEq => CmpOpKind::NotEq,
        ast::CmpOp::Lt => CmpOpKind::Lt,
        ast::CmpOp::LtE => CmpOpKind::LtE,
        ast::CmpOp::Gt => CmpOpKind::Gt,
        ast::CmpOp::GtE => CmpOpKind::GtE,
        ast::CmpOp::Is => CmpOpKind::Is,
        ast::CmpOp::IsNot => CmpOpKind::IsNot,
        ast::CmpOp::In => CmpOpKind::In,
        ast::CmpOp::NotIn => CmpOpKind::NotIn,
    }
}

fn generators_from_ast(
    generators: &[ast::Comprehension],
    scope: Option<ObjectId>,
) -> Vec<Generator> {
    generators
        .iter()
        .map(|generator| Generator {
            // Comprehension targets are bare target lists in source.
            target: match &generator.target {
                ast::Expr::Tuple(tuple) => Expr::Tuple {
                    elements: tuple
                        .elts
                        .iter()
                        .map(|element| Expr::from_ast(element, scope))
                        .collect(),
                    implicit: true,
                },
                other => Expr::from_ast(other, scope),
            },
            iter: Expr::from_ast(&generator.iter, scope),
            conditions: generator
                .ifs
                .iter()
                .map(|condition| Expr::from_ast(condition, scope))
                .collect(),
            is_async: generator.is_async,
        })
        .collect()
}

// ============================================================================
// String re-parsing
// ============================================================================

/// Parse a source string as a single expression, binding names to `scope`.
pub fn parse_expr(source: &str, scope: Option<ObjectId>) -> Result<Expr> {
    let parsed = rustpython_parser::parse(source, Mode::Expression, "<expression>").map_err(
        |error| GriffeError::ExpressionParse {
            expr_source: source.to_string(),
            message: error.to_string(),
        },
    )?;
    match parsed {
        ast::Mod::Expression(module) => Ok(Expr::from_ast(&module.body, scope)),
        _ => Err(GriffeError::ExpressionParse {
            expr_source: source.to_string(),
            message: "not an expression".to_string(),
        }),
    }
}

/// Non-raising form of [`parse_expr`]: logs the failure and returns `None`.
pub fn safe_parse_expr(source: &str, scope: Option<ObjectId>) -> Option<Expr> {
    match parse_expr(source, scope) {
        Ok(expr) => Some(expr),
        Err(error) => {
            warn!("failed to parse expression: {error}");
            None
        }
    }
}

// ============================================================================
// Modernization
// ============================================================================

const TYPING_ALIASES: &[(&str, &str)] = &[
    ("List", "list"),
    ("Dict", "dict"),
    ("Set", "set"),
    ("FrozenSet", "frozenset"),
    ("Tuple", "tuple"),
    ("Type", "type"),
    ("Text", "str"),
];

fn typing_head(expr: &Expr) -> Option<&'static str> {
    let dotted = expr.dotted()?;
    let (module, tail) = match dotted.rsplit_once('.') {
        Some((module, tail)) => (module, tail),
        None => ("typing", dotted.as_str()),
    };
    if module != "typing" && module != "typing_extensions" && module != "t" {
        return None;
    }
    match tail {
        "Optional" => Some("Optional"),
        "Union" => Some("Union"),
        other => TYPING_ALIASES
            .iter()
            .find(|(name, _)| *name == other)
            .map(|(name, _)| *name),
    }
}

fn replacement_for(alias: &str, scope: Option<ObjectId>) -> Option<Expr> {
    TYPING_ALIASES
        .iter()
        .find(|(name, _)| *name == alias)
        .map(|(_, replacement)| Expr::Name {
            ident: (*replacement).to_string(),
            scope,
        })
}

fn union_of(elements: Vec<Expr>) -> Expr {
    let mut iter = elements.into_iter();
    let first = iter.next().unwrap_or_else(|| Expr::constant("None"));
    iter.fold(first, |left, right| Expr::BinOp {
        left: Box::new(left),
        op: BinOpKind::BitOr,
        right: Box::new(right),
    })
}

/// Rewrite `typing.Union`/`typing.Optional` and the deprecated typing
/// generics to their modern spellings. Pure and idempotent: the input is
/// untouched and a new tree is returned.
pub fn modernize(expr: &Expr) -> Expr {
    match expr {
        Expr::Subscript { value, slice } => {
            let scope = value.scope();
            match typing_head(value) {
                Some("Optional") => {
                    let inner = modernize(slice);
                    Expr::BinOp {
                        left: Box::new(inner),
                        op: BinOpKind::BitOr,
                        right: Box::new(Expr::constant("None")),
                    }
                }
                Some("Union") => match slice.as_ref() {
                    Expr::Tuple { elements, .. } => {
                        union_of(elements.iter().map(modernize).collect())
                    }
                    single => modernize(single),
                },
                Some(alias) => Expr::Subscript {
                    value: Box::new(
                        replacement_for(alias, scope).unwrap_or_else(|| (**value).clone()),
                    ),
                    slice: Box::new(modernize(slice)),
                },
                None => Expr::Subscript {
                    value: Box::new(modernize(value)),
                    slice: Box::new(modernize(slice)),
                },
            }
        }
        Expr::Name { .. } | Expr::Attribute { .. } => {
            if let Some(replacement) =
                typing_head(expr).and_then(|head| replacement_for(head, expr.scope()))
            {
                replacement
            } else if let Expr::Attribute { value, attr } = expr {
                Expr::Attribute {
                    value: Box::new(modernize(value)),
                    attr: attr.clone(),
                }
            } else {
                expr.clone()
            }
        }
        Expr::Constant { .. } => expr.clone(),
        Expr::Tuple { elements, implicit } => Expr::Tuple {
            elements: elements.iter().map(modernize).collect(),
            implicit: *implicit,
        },
        Expr::List { elements } => Expr::List {
            elements: elements.iter().map(modernize).collect(),
        },
        Expr::Set { elements } => Expr::Set {
            elements: elements.iter().map(modernize).collect(),
        },
        Expr::Dict { keys, values } => Expr::Dict {
            keys: keys
                .iter()
                .map(|key| key.as_ref().map(modernize))
                .collect(),
            values: values.iter().map(modernize).collect(),
        },
        Expr::Comprehension {
            kind,
            element,
            value,
            generators,
        } => Expr::Comprehension {
            kind: *kind,
            element: Box::new(modernize(element)),
            value: value.as_deref().map(|value| Box::new(modernize(value))),
            generators: generators
                .iter()
                .map(|generator| Generator {
                    target: modernize(&generator.target),
                    iter: modernize(&generator.iter),
                    conditions: generator.conditions.iter().map(modernize).collect(),
                    is_async: generator.is_async,
                })
                .collect(),
        },
        Expr::Slice { lower, upper, step } => Expr::Slice {
            lower: lower.as_deref().map(|lower| Box::new(modernize(lower))),
            upper: upper.as_deref().map(|upper| Box::new(modernize(upper))),
            step: step.as_deref().map(|step| Box::new(modernize(step))),
        },
        Expr::UnaryOp { op, operand } => Expr::UnaryOp {
            op: *op,
            operand: Box::new(modernize(operand)),
        },
        Expr::BinOp { left, op, right } => Expr::BinOp {
            left: Box::new(modernize(left)),
            op: *op,
            right: Box::new(modernize(right)),
        },
        Expr::BoolOp { op, values } => Expr::BoolOp {
            op: *op,
            values: values.iter().map(modernize).collect(),
        },
        Expr::Compare {
            left,
            ops,
            comparators,
        } => Expr::Compare {
            left: Box::new(modernize(left)),
            ops: ops.clone(),
            comparators: comparators.iter().map(modernize).collect(),
        },
        Expr::Call {
            function,
            arguments,
        } => Expr::Call {
            function: Box::new(modernize(function)),
            arguments: arguments.iter().map(modernize).collect(),
        },
        Expr::Keyword { name, value } => Expr::Keyword {
            name: name.clone(),
            value: Box::new(modernize(value)),
        },
        Expr::VarPositional { value } => Expr::VarPositional {
            value: Box::new(modernize(value)),
        },
        Expr::VarKeyword { value } => Expr::VarKeyword {
            value: Box::new(modernize(value)),
        },
        Expr::Lambda { parameters, body } => Expr::Lambda {
            parameters: parameters
                .iter()
                .map(|parameter| LambdaParameter {
                    name: parameter.name.clone(),
                    kind: parameter.kind,
                    default: parameter
                        .default
                        .as_deref()
                        .map(|default| Box::new(modernize(default))),
                })
                .collect(),
            body: Box::new(modernize(body)),
        },
        Expr::IfElse { body, test, orelse } => Expr::IfElse {
            body: Box::new(modernize(body)),
            test: Box::new(modernize(test)),
            orelse: Box::new(modernize(orelse)),
        },
        Expr::Named { target, value } => Expr::Named {
            target: Box::new(modernize(target)),
            value: Box::new(modernize(value)),
        },
        Expr::Yield { value } => Expr::Yield {
            value: value.as_deref().map(|value| Box::new(modernize(value))),
        },
        Expr::YieldFrom { value } => Expr::YieldFrom {
            value: Box::new(modernize(value)),
        },
        Expr::Await { value } => Expr::Await {
            value: Box::new(modernize(value)),
        },
        Expr::FString { values } => Expr::FString {
            values: values.iter().map(modernize).collect(),
        },
        Expr::FormattedValue {
            value,
            conversion,
            format_spec,
        } => Expr::FormattedValue {
            value: Box::new(modernize(value)),
            conversion: *conversion,
            format_spec: format_spec
                .as_deref()
                .map(|spec| Box::new(modernize(spec))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Expr {
        parse_expr(source, None).unwrap()
    }

    mod rendering {
        use super::*;

        #[test]
        fn atoms_round_trip() {
            for source in [
                "x",
                "x.y.z",
                "x[1]",
                "x[1:2]",
                "x[1:2:3]",
                "x[:2]",
                "[1, 2, 3]",
                "(1, 2)",
                "{1, 2}",
                "{'a': 1, **rest}",
                "f(1, 2, *args, key=3, **kwargs)",
                "None",
                "True",
                "...",
            ] {
                assert_eq!(parse(source).to_string(), source, "source: {source}");
            }
        }

        #[test]
        fn operator_precedence_no_redundant_parens() {
            assert_eq!(parse("(a + b) * c").to_string(), "(a + b) * c");
            assert_eq!(parse("a + b * c").to_string(), "a + b * c");
            assert_eq!(parse("a ** -b").to_string(), "a ** -b");
            assert_eq!(
                parse("a if b else c if d else e").to_string(),
                "a if b else c if d else e",
            );
        }

        #[test]
        fn power_is_right_associative() {
            assert_eq!(parse("a ** b ** c").to_string(), "a ** b ** c");
            assert_eq!(parse("(a ** b) ** c").to_string(), "(a ** b) ** c");
            assert_eq!(parse("(-a) ** b").to_string(), "(-a) ** b");
        }

        #[test]
        fn ternary_body_needs_parens() {
            assert_eq!(
                parse("(a if b else c) if d else e").to_string(),
                "(a if b else c) if d else e",
            );
        }

        #[test]
        fn bool_and_compare_chains() {
            assert_eq!(parse("a or b and not c").to_string(), "a or b and not c");
            assert_eq!(parse("(a or b) and c").to_string(), "(a or b) and c");
            assert_eq!(parse("a < b <= c").to_string(), "a < b <= c");
            assert_eq!(parse("x is not None").to_string(), "x is not None");
        }

        #[test]
        fn comprehensions() {
            assert_eq!(
                parse("[x for x in items if x]").to_string(),
                "[x for x in items if x]",
            );
            assert_eq!(
                parse("{k: v for k, v in pairs}").to_string(),
                "{k: v for k, v in pairs}",
            );
        }

        #[test]
        fn lambdas() {
            assert_eq!(parse("lambda: 1").to_string(), "lambda: 1");
            assert_eq!(parse("lambda x, y=1: x + y").to_string(), "lambda x, y=1: x + y");
            assert_eq!(parse("lambda *args, **kwargs: 0").to_string(), "lambda *args, **kwargs: 0");
        }

        #[test]
        fn strings_and_fstrings() {
            assert_eq!(parse("'text'").to_string(), "'text'");
            assert_eq!(parse("f\"{x!r:>{width}}\"").to_string(), "f\"{x!r:>{width}}\"");
            assert_eq!(parse("f\"a{b}c\"").to_string(), "f\"a{b}c\"");
        }

        #[test]
        fn walrus_parenthesized_in_item_position() {
            assert_eq!(parse("f((a := 1))").to_string(), "f((a := 1))");
        }

        #[test]
        fn rendering_is_stable_under_reparse() {
            for source in [
                "dict[str, list[int]]",
                "Callable[[int, str], None]",
                "a + b * c ** -d",
                "x[1:2, 3]",
                "{**base, 'k': v}",
            ] {
                let first = parse(source).to_string();
                let second = parse(&first).to_string();
                assert_eq!(first, second, "source: {source}");
            }
        }
    }

    mod modernization {
        use super::*;

        #[test]
        fn optional_union_nested() {
            let expr = parse("typing.Optional[typing.Union[int, str]]");
            assert_eq!(modernize(&expr).to_string(), "int | str | None");
        }

        #[test]
        fn union_flat() {
            let expr = parse("typing.Union[int, str, bytes]");
            assert_eq!(modernize(&expr).to_string(), "int | str | bytes");
        }

        #[test]
        fn generics_renamed() {
            let expr = parse("typing.List[typing.Dict[str, int]]");
            assert_eq!(modernize(&expr).to_string(), "list[dict[str, int]]");
        }

        #[test]
        fn bare_alias_renamed() {
            let expr = parse("typing.List");
            assert_eq!(modernize(&expr).to_string(), "list");
        }

        #[test]
        fn unqualified_names_handled() {
            let expr = parse("Optional[int]");
            assert_eq!(modernize(&expr).to_string(), "int | None");
        }

        #[test]
        fn idempotent() {
            for source in [
                "typing.Optional[typing.Union[int, str]]",
                "typing.List[int]",
                "dict[str, int]",
                "int | None",
            ] {
                let once = modernize(&parse(source));
                let twice = modernize(&once);
                assert_eq!(once, twice, "source: {source}");
            }
        }

        #[test]
        fn non_typing_subscripts_untouched() {
            let expr = parse("collections.OrderedDict[str, int]");
            assert_eq!(
                modernize(&expr).to_string(),
                "collections.OrderedDict[str, int]",
            );
        }
    }

    mod safe_construction {
        use super::*;

        #[test]
        fn parse_expr_raises_on_garbage() {
            assert!(parse_expr("def not an expression", None).is_err());
        }

        #[test]
        fn safe_parse_expr_returns_none_on_garbage() {
            assert!(safe_parse_expr("1 +", None).is_none());
            assert!(safe_parse_expr("list[int]", None).is_some());
        }
    }
}
