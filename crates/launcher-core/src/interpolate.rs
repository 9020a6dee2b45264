//! Interpolation: resolves `${...}` references inside a composed config.
//!
//! Forms understood:
//! - `${a.b}` absolute path from the root
//! - `${.b}`, `${..b}` relative, one dot per level starting at the mapping
//!   that holds the value
//! - `${multiply:x,y}`, `${divide_ceil:x,y}`, `${divide_floor:x,y}`
//!
//! A value made of a single reference keeps the referenced type; anything
//! else is rendered into a string. `\${` stays a literal `${`.

use serde_yaml::{Mapping, Number, Value};

use crate::config::render_inline;
use crate::error::LauncherError;

/// Resolve every interpolation under `root`.
pub(crate) fn resolve_tree(root: &Mapping) -> Result<Mapping, LauncherError> {
    let mut resolver = Resolver {
        root,
        visiting: Vec::new(),
    };
    resolver.mapping(root, &[])
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Reference(String),
    Call { name: String, args: Vec<Vec<Piece>> },
}

struct Resolver<'a> {
    root: &'a Mapping,
    visiting: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn mapping(&mut self, mapping: &Mapping, path: &[String]) -> Result<Mapping, LauncherError> {
        let mut out = Mapping::with_capacity(mapping.len());
        for (key, value) in mapping {
            let child = child_path(path, render_inline(key));
            out.insert(key.clone(), self.value(value, &child)?);
        }
        Ok(out)
    }

    fn value(&mut self, value: &Value, path: &[String]) -> Result<Value, LauncherError> {
        match value {
            Value::Mapping(mapping) => Ok(Value::Mapping(self.mapping(mapping, path)?)),
            Value::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| self.value(item, &child_path(path, index.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Sequence),
            Value::String(text) if text.contains("${") => {
                let pieces = parse(text)?;
                match pieces.as_slice() {
                    [Piece::Expr(expr)] => self.evaluate(expr, path),
                    _ => Ok(Value::String(self.concat(&pieces, path)?)),
                }
            }
            other => Ok(other.clone()),
        }
    }

    fn concat(&mut self, pieces: &[Piece], path: &[String]) -> Result<String, LauncherError> {
        let mut out = String::new();
        for piece in pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Expr(expr) => out.push_str(&render_inline(&self.evaluate(expr, path)?)),
            }
        }
        Ok(out)
    }

    fn evaluate(&mut self, expr: &Expr, path: &[String]) -> Result<Value, LauncherError> {
        match expr {
            Expr::Reference(reference) => self.reference(reference, path),
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.argument(arg, path))
                    .collect::<Result<Vec<_>, _>>()?;
                call(name, &values)
            }
        }
    }

    fn argument(&mut self, pieces: &[Piece], path: &[String]) -> Result<Value, LauncherError> {
        let pieces: Vec<Piece> = pieces
            .iter()
            .filter(|piece| !matches!(piece, Piece::Text(text) if text.trim().is_empty()))
            .cloned()
            .collect();
        match pieces.as_slice() {
            [Piece::Expr(expr)] => self.evaluate(expr, path),
            [Piece::Text(text)] => {
                let text = text.trim();
                Ok(serde_yaml::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
            }
            _ => Ok(Value::String(self.concat(&pieces, path)?)),
        }
    }

    fn reference(&mut self, reference: &str, path: &[String]) -> Result<Value, LauncherError> {
        let target = absolute_path(reference, path)?;
        let key = target.join(".");
        if self.visiting.contains(&key) {
            return Err(LauncherError::Config(format!(
                "interpolation cycle through `{key}`"
            )));
        }

        let root = self.root;
        let node = lookup(root, &target).ok_or_else(|| {
            LauncherError::Config(format!(
                "interpolation `${{{reference}}}` at `{}`: `{key}` not found",
                path.join(".")
            ))
        })?;

        self.visiting.push(key);
        let resolved = self.value(node, &target);
        self.visiting.pop();
        resolved
    }
}

fn child_path(path: &[String], key: String) -> Vec<String> {
    let mut child = path.to_vec();
    child.push(key);
    child
}

/// Turn a possibly relative reference into a path from the root.
fn absolute_path(reference: &str, path: &[String]) -> Result<Vec<String>, LauncherError> {
    let dots = reference.chars().take_while(|c| *c == '.').count();
    let rest = &reference[dots..];

    let mut target = if dots == 0 {
        Vec::new()
    } else {
        let parent = path.len().saturating_sub(1);
        let up = dots - 1;
        if up > parent {
            return Err(LauncherError::Config(format!(
                "interpolation `${{{reference}}}` at `{}` climbs above the root",
                path.join(".")
            )));
        }
        path[..parent - up].to_vec()
    };

    if rest.is_empty() && dots == 0 {
        return Err(LauncherError::Config(format!(
            "empty interpolation at `{}`",
            path.join(".")
        )));
    }
    if !rest.is_empty() {
        target.extend(rest.split('.').map(str::to_string));
    }
    Ok(target)
}

fn lookup<'v>(root: &'v Mapping, path: &[String]) -> Option<&'v Value> {
    let (first, rest) = path.split_first()?;
    let mut node = root.get(first.as_str())?;
    for part in rest {
        node = match node {
            Value::Sequence(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part.as_str())?,
        };
    }
    Some(node)
}

fn call(name: &str, args: &[Value]) -> Result<Value, LauncherError> {
    if !matches!(name, "multiply" | "divide_ceil" | "divide_floor") {
        return Err(LauncherError::Config(format!("unknown resolver `{name}`")));
    }
    let [x, y] = args else {
        return Err(LauncherError::Config(format!(
            "resolver `{name}` takes 2 arguments, got {}",
            args.len()
        )));
    };
    let (x, y) = (number(name, x)?, number(name, y)?);

    if name == "multiply" {
        if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
            if let Some(product) = a.checked_mul(b) {
                return Ok(Value::Number(product.into()));
            }
        }
        return Ok(Value::Number(Number::from(as_f64(&x) * as_f64(&y))));
    }

    let divisor = as_f64(&y);
    if divisor == 0.0 {
        return Err(LauncherError::Config(format!("resolver `{name}` divides by zero")));
    }
    let quotient = as_f64(&x) / divisor;
    let rounded = if name == "divide_ceil" {
        quotient.ceil()
    } else {
        quotient.floor()
    };
    Ok(Value::Number((rounded as i64).into()))
}

fn number(resolver: &str, value: &Value) -> Result<Number, LauncherError> {
    let parsed = match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => serde_yaml::from_str::<Number>(s.trim()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        LauncherError::Config(format!(
            "resolver `{resolver}` expects numbers, got `{}`",
            render_inline(value)
        ))
    })
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or_default()
}

fn parse(text: &str) -> Result<Vec<Piece>, LauncherError> {
    let mut parser = Parser {
        text,
        chars: text.chars().collect(),
        pos: 0,
    };
    parser.pieces(&[])
}

struct Parser<'s> {
    text: &'s str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    /// Literal text and `${...}` expressions up to the end or a `stops` char.
    fn pieces(&mut self, stops: &[char]) -> Result<Vec<Piece>, LauncherError> {
        let mut pieces = Vec::new();
        let mut text = String::new();

        while let Some(&c) = self.chars.get(self.pos) {
            if stops.contains(&c) {
                break;
            }
            if c == '\\' && self.opens_at(self.pos + 1) {
                text.push_str("${");
                self.pos += 3;
            } else if c == '$' && self.opens_at(self.pos) {
                if !text.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut text)));
                }
                self.pos += 2;
                pieces.push(Piece::Expr(self.expression()?));
            } else {
                text.push(c);
                self.pos += 1;
            }
        }

        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Ok(pieces)
    }

    /// Body of an expression, right after its `${`.
    fn expression(&mut self) -> Result<Expr, LauncherError> {
        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            match c {
                '}' => {
                    let reference = self.slice(start);
                    self.pos += 1;
                    return Ok(Expr::Reference(reference));
                }
                ':' => {
                    let name = self.slice(start);
                    self.pos += 1;
                    let mut args = Vec::new();
                    loop {
                        args.push(self.pieces(&[',', '}'])?);
                        match self.chars.get(self.pos) {
                            Some(',') => self.pos += 1,
                            Some('}') => {
                                self.pos += 1;
                                return Ok(Expr::Call { name, args });
                            }
                            _ => return Err(self.unterminated()),
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }
        Err(self.unterminated())
    }

    fn opens_at(&self, pos: usize) -> bool {
        self.chars.get(pos) == Some(&'$') && self.chars.get(pos + 1) == Some(&'{')
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect::<String>().trim().to_string()
    }

    fn unterminated(&self) -> LauncherError {
        LauncherError::Config(format!("unterminated interpolation in `{}`", self.text))
    }
}
