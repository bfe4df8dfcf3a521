//! USDA value literals.
//!
//! A small reader for the literal forms that appear on the right-hand side of
//! attribute and metadata assignments, and the conversion from those untyped
//! literals into [`AttributeValue`]s driven by the declared type name.

use crate::value::AttributeValue;

/// An untyped USDA literal.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Number(f64),
    Str(String),
    /// Bare word (`true`, `None`, ...)
    Ident(String),
    Tuple(Vec<RawValue>),
    List(Vec<RawValue>),
    /// `</Prim/Path>`
    Path(String),
    /// `@asset@` with an optional `</Prim>` target
    Asset { asset: String, prim: Option<String> },
    /// `{ type key = value ... }`
    Dict(Vec<DictEntry>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DictEntry {
    pub type_name: String,
    pub key: String,
    pub value: RawValue,
}

impl RawValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            RawValue::Ident(word) if word == "true" => Some(1.0),
            RawValue::Ident(word) if word == "false" => Some(0.0),
            _ => None,
        }
    }

    /// Textual content of strings, words, paths and assets.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Str(s) | RawValue::Ident(s) | RawValue::Path(s) => Some(s.clone()),
            RawValue::Asset { asset, prim } => Some(match prim {
                Some(prim) => format!("@{}@<{}>", asset, prim),
                None => asset.clone(),
            }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RawValue::Ident(word) => match word.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            RawValue::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    /// Items of a list, or the value itself as a one-element list.
    pub fn items(&self) -> Vec<&RawValue> {
        match self {
            RawValue::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// All numbers of a (possibly nested) tuple, flattened.
    pub fn flatten_numbers(&self) -> Option<Vec<f64>> {
        match self {
            RawValue::Tuple(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(item.flatten_numbers()?);
                }
                Some(out)
            }
            other => other.as_f64().map(|n| vec![n]),
        }
    }
}

/// Cursor over the text of one statement.
pub struct ValueReader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ValueReader<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Unconsumed input.
    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Skip whitespace and entry separators (`;`, `,`).
    pub fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() || c == ';' || c == ',') {
            self.bump();
        }
    }

    pub fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub fn is_at_end(&mut self) -> bool {
        self.skip_ws();
        self.peek().is_none()
    }

    /// Read a bare word: identifiers, namespaced names, numbers, `type[]`.
    pub fn word(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_word_char(c)) {
            self.bump();
        }
        if self.pos > start && self.rest().starts_with("[]") {
            self.pos += 2;
        }
        (self.pos > start).then(|| &self.src[start..self.pos])
    }

    /// Parse one literal.
    pub fn value(&mut self) -> Result<RawValue, String> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.bump();
                self.sequence(')').map(RawValue::Tuple)
            }
            Some('[') => {
                self.bump();
                self.sequence(']').map(RawValue::List)
            }
            Some('{') => {
                self.bump();
                self.dict().map(RawValue::Dict)
            }
            Some('"') | Some('\'') => self.string().map(RawValue::Str),
            Some('<') => self.path().map(RawValue::Path),
            Some('@') => self.asset(),
            Some(c) if is_word_char(c) => {
                let word = self.word().unwrap_or_default();
                Ok(match word.parse::<f64>() {
                    Ok(n) => RawValue::Number(n),
                    Err(_) => RawValue::Ident(word.to_string()),
                })
            }
            Some(c) => Err(format!("unexpected character '{}'", c)),
            None => Err("unexpected end of value".to_string()),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Vec<RawValue>, String> {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                None => return Err(format!("missing '{}'", close)),
                _ => items.push(self.value()?),
            }
        }
    }

    fn dict(&mut self) -> Result<Vec<DictEntry>, String> {
        let mut entries = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(entries);
                }
                None => return Err("missing '}'".to_string()),
                _ => {}
            }
            let type_name = self
                .word()
                .ok_or_else(|| format!("expected dictionary entry type near '{}'", self.rest()))?
                .to_string();
            self.skip_ws();
            let key = if matches!(self.peek(), Some('"') | Some('\'')) {
                self.string()?
            } else {
                self.word()
                    .ok_or_else(|| "expected dictionary key".to_string())?
                    .to_string()
            };
            if !self.eat('=') {
                return Err(format!("expected '=' after dictionary key '{}'", key));
            }
            let value = self.value()?;
            entries.push(DictEntry {
                type_name,
                key,
                value,
            });
        }
    }

    /// Quoted string, single or triple quoted, with backslash escapes.
    pub fn string(&mut self) -> Result<String, String> {
        self.skip_ws();
        let quote = self.bump().ok_or_else(|| "expected string".to_string())?;
        let triple: String = std::iter::repeat(quote).take(3).collect();
        let is_triple = self.src[self.pos - quote.len_utf8()..].starts_with(&triple);
        if is_triple {
            self.pos += 2 * quote.len_utf8();
            let end = self.rest().find(&triple).ok_or_else(|| "unterminated string".to_string())?;
            let text = self.rest()[..end].to_string();
            self.pos += end + triple.len();
            return Ok(text);
        }

        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err("unterminated string".to_string()),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn path(&mut self) -> Result<String, String> {
        self.bump();
        let end = self.rest().find('>').ok_or_else(|| "unterminated path".to_string())?;
        let path = self.rest()[..end].to_string();
        self.pos += end + 1;
        Ok(path)
    }

    fn asset(&mut self) -> Result<RawValue, String> {
        let delimiter = if self.rest().starts_with("@@@") { "@@@" } else { "@" };
        self.pos += delimiter.len();
        let end = self.rest().find(delimiter).ok_or_else(|| "unterminated asset path".to_string())?;
        let asset = self.rest()[..end].to_string();
        self.pos += end + delimiter.len();
        let prim = if self.peek() == Some('<') {
            Some(self.path()?)
        } else {
            None
        };
        Ok(RawValue::Asset { asset, prim })
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '.' | '-' | '+')
}

/// Value categories keyed off the USD type name.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Category {
    Bool,
    Int,
    Float,
    Text,
    Color,
    Tuple,
    Matrix,
}

fn category(base: &str) -> Option<Category> {
    match base {
        "bool" => return Some(Category::Bool),
        "int" | "uint" | "int64" | "uint64" | "uchar" => return Some(Category::Int),
        "float" | "double" | "half" | "timecode" => return Some(Category::Float),
        "string" | "token" | "asset" => return Some(Category::Text),
        _ => {}
    }
    if base.starts_with("color") {
        return Some(Category::Color);
    }
    if base.starts_with("matrix") {
        return Some(Category::Matrix);
    }
    let tuple_prefixes = [
        "float", "double", "half", "int", "point", "normal", "vector", "texCoord", "quat", "frame",
    ];
    if tuple_prefixes.iter().any(|p| base.starts_with(p)) {
        return Some(Category::Tuple);
    }
    None
}

/// Convert a literal to a typed attribute value.
///
/// Returns `None` for unsupported types (`dictionary`, `opaque`, ...) and for
/// literals that do not match the declared type.
pub fn to_attribute_value(type_name: &str, raw: &RawValue) -> Option<AttributeValue> {
    let (base, is_array) = match type_name.strip_suffix("[]") {
        Some(base) => (base, true),
        None => (type_name, false),
    };
    let category = category(base)?;

    if is_array {
        let items = match raw {
            RawValue::List(items) => items,
            _ => return None,
        };
        return Some(match category {
            Category::Bool | Category::Int => AttributeValue::IntArray(
                items.iter().filter_map(|v| v.as_f64()).map(|n| n as i64).collect(),
            ),
            Category::Float => {
                AttributeValue::FloatArray(items.iter().filter_map(|v| v.as_f64()).collect())
            }
            Category::Text => {
                AttributeValue::StringArray(items.iter().filter_map(|v| v.as_text()).collect())
            }
            Category::Color | Category::Tuple | Category::Matrix => AttributeValue::VectorArray(
                items.iter().filter_map(|v| v.flatten_numbers()).collect(),
            ),
        });
    }

    match category {
        Category::Bool => raw.as_bool().map(AttributeValue::Bool),
        Category::Int => raw.as_f64().map(|n| AttributeValue::Int(n as i64)),
        Category::Float => raw.as_f64().map(AttributeValue::Float),
        Category::Text => raw.as_text().map(AttributeValue::String),
        Category::Color => {
            let numbers = raw.flatten_numbers()?;
            Some(match numbers.as_slice() {
                [r, g, b] => AttributeValue::Color([*r, *g, *b]),
                _ => AttributeValue::Vector(numbers),
            })
        }
        Category::Tuple => raw.flatten_numbers().map(AttributeValue::Vector),
        Category::Matrix => {
            let numbers = raw.flatten_numbers()?;
            if numbers.len() == 16 {
                let mut rows = [[0.0; 4]; 4];
                for (i, n) in numbers.iter().enumerate() {
                    rows[i / 4][i % 4] = *n;
                }
                Some(AttributeValue::Matrix(rows))
            } else {
                Some(AttributeValue::Vector(numbers))
            }
        }
    }
}
