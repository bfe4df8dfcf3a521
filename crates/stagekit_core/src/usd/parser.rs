//! USDA (ASCII) layer parser.
//!
//! The source text is first normalized into logical statements: braces that
//! open or close a block sit on their own line, and values spanning several
//! physical lines (arrays, metadata blocks) are joined into one statement.
//! The parser then walks those statements line by line.
//!
//! # Supported Syntax
//!
//! - Layer header metadata: `upAxis`, `metersPerUnit`, `defaultPrim`, `doc`
//! - `def Type "Name" (metadata) { ... }`, `over "Name" { ... }`, `class` (skipped)
//! - `variantSet "name" = { "option" { ... } ... }`
//! - Typed attributes (`float3[] points = [...]`, `color3f inputs:diffuseColor = (...)`)
//! - Attribute metadata (`interpolation = "faceVarying"`)
//! - `rel material:binding = </Path>` and `inputs:x.connect = </Path.outputs:y>`
//! - `xformOp:translate|scale|rotateX|rotateY|rotateZ|rotateXYZ|orient|transform`,
//!   optionally suffixed (`xformOp:scale:size`), and `xformOpOrder`

use std::collections::VecDeque;

use stagekit_math::{DMat4, DQuat, DVec3};
use thiserror::Error;

use super::types::*;
use super::values::{to_attribute_value, RawValue, ValueReader};
use crate::value::Attribute;

/// Errors that can occur during USDA parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Unclosed block starting at line {0}")]
    UnclosedBlock(usize),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A `key = value` entry of a metadata block.
#[derive(Clone, Debug)]
struct MetadataEntry {
    key: String,
    value: RawValue,
}

const QUALIFIERS: &[&str] = &[
    "custom", "uniform", "varying", "config", "prepend", "append", "add", "delete", "reorder",
];

/// USDA layer parser.
pub struct UsdaParser {
    lines: VecDeque<(usize, String)>,
    current_line: usize,
}

impl UsdaParser {
    /// Create a new parser from file contents.
    pub fn new(content: &str) -> Self {
        Self {
            lines: split_statements(content),
            current_line: 0,
        }
    }

    /// Parse the layer: header metadata and root prims.
    pub fn parse(&mut self) -> ParseResult<UsdLayer> {
        let mut layer = UsdLayer::default();

        if matches!(self.lines.front(), Some((_, line)) if line.starts_with('(')) {
            let (line_num, line) = self.next_line().ok_or(ParseError::UnexpectedEof)?;
            let entries = self.metadata_from(&line, line_num)?;
            apply_layer_metadata(&mut layer.metadata, entries);
        }

        while let Some((line_num, line)) = self.next_line() {
            if is_prim_header(&line) {
                if let Some(prim) = self.parse_prim(&line, "", line_num)? {
                    layer.prims.push(prim);
                }
                continue;
            }
            if line == "}" {
                return Err(self.error(line_num, "Unexpected '}'"));
            }
            log::warn!("Skipping unsupported statement at line {}: {}", line_num, line);
            self.skip_attached_block()?;
        }

        Ok(layer)
    }

    fn next_line(&mut self) -> Option<(usize, String)> {
        let (num, line) = self.lines.pop_front()?;
        self.current_line = num;
        Some((num, line))
    }

    fn error(&self, line: usize, message: impl Into<String>) -> ParseError {
        ParseError::Parse {
            line,
            message: message.into(),
        }
    }

    /// Parse a prim header line and its block.
    ///
    /// Returns `None` for `class` prims, which never become part of the tree.
    fn parse_prim(
        &mut self,
        header: &str,
        parent_path: &str,
        start_line: usize,
    ) -> ParseResult<Option<PrimSpec>> {
        let mut reader = ValueReader::new(header);
        let specifier = match reader.word() {
            Some("def") => Specifier::Def,
            Some("over") => Specifier::Over,
            Some("class") => Specifier::Class,
            other => {
                return Err(self.error(
                    start_line,
                    format!("Expected prim specifier, found {:?}", other),
                ))
            }
        };

        reader.skip_ws();
        let type_name = match reader.peek() {
            Some('"') | Some('\'') => String::new(),
            _ => reader.word().unwrap_or_default().to_string(),
        };
        let name = reader
            .string()
            .map_err(|m| self.error(start_line, format!("Invalid prim name: {}", m)))?;
        if name.is_empty() {
            return Err(self.error(start_line, "Empty prim name"));
        }

        let mut spec = PrimSpec::new(specifier, type_name, name);

        reader.skip_ws();
        if reader.peek() == Some('(') {
            let entries = parse_metadata_block(&mut reader)
                .map_err(|m| self.error(start_line, m))?;
            apply_prim_metadata(&mut spec.metadata, entries);
        }

        let path = child_path(parent_path, &spec.name);
        self.expect_opening_brace(start_line)?;
        self.parse_body(&mut spec, &path, start_line)?;

        if specifier == Specifier::Class {
            log::debug!("Skipping class prim {}", path);
            return Ok(None);
        }

        Ok(Some(spec))
    }

    /// Parse block content up to and including the closing brace.
    fn parse_body(
        &mut self,
        spec: &mut PrimSpec,
        path: &str,
        start_line: usize,
    ) -> ParseResult<()> {
        loop {
            let (line_num, line) = self
                .next_line()
                .ok_or(ParseError::UnclosedBlock(start_line))?;

            if line == "}" {
                return Ok(());
            }

            if line == "{" {
                log::debug!("Skipping anonymous block at line {}", line_num);
                self.skip_block(line_num)?;
                continue;
            }

            if is_prim_header(&line) {
                if let Some(child) = self.parse_prim(&line, path, line_num)? {
                    spec.children.push(child);
                }
                continue;
            }

            if line.starts_with("variantSet") {
                self.parse_variant_set(&line, spec, path, line_num)?;
                continue;
            }

            self.parse_property(&line, spec, path, line_num)?;
        }
    }

    /// Parse a `variantSet "name" = { ... }` block into `spec`.
    fn parse_variant_set(
        &mut self,
        line: &str,
        spec: &mut PrimSpec,
        path: &str,
        start_line: usize,
    ) -> ParseResult<()> {
        let mut reader = ValueReader::new(line);
        reader.word();
        let name = reader
            .string()
            .map_err(|m| self.error(start_line, format!("Invalid variant set name: {}", m)))?;
        if !reader.eat('=') {
            return Err(self.error(start_line, "Expected '=' after variant set name"));
        }
        self.expect_opening_brace(start_line)?;

        let mut set = VariantSetSpec {
            name,
            options: Vec::new(),
        };

        loop {
            let (option_line, text) = self
                .next_line()
                .ok_or(ParseError::UnclosedBlock(start_line))?;
            if text == "}" {
                break;
            }

            let option_name = ValueReader::new(&text)
                .string()
                .map_err(|m| self.error(option_line, format!("Invalid variant name: {}", m)))?;
            self.expect_opening_brace(option_line)?;

            let mut body = PrimSpec::new(Specifier::Over, "", spec.name.clone());
            self.parse_body(&mut body, path, option_line)?;
            if !body.variant_sets.is_empty() {
                log::warn!(
                    "Nested variant sets in {}{{{}={}}} are not supported and were ignored",
                    path,
                    set.name,
                    option_name
                );
                body.variant_sets.clear();
            }

            set.options.push(VariantOptionSpec {
                name: option_name,
                body,
            });
        }

        match spec.variant_sets.iter_mut().find(|s| s.name == set.name) {
            Some(existing) => existing.options.extend(set.options),
            None => spec.variant_sets.push(set),
        }
        Ok(())
    }

    /// Parse an attribute or relationship statement.
    fn parse_property(
        &mut self,
        line: &str,
        spec: &mut PrimSpec,
        path: &str,
        line_num: usize,
    ) -> ParseResult<()> {
        let (lhs, rhs) = split_assignment(line);
        let words: Vec<&str> = lhs
            .split_whitespace()
            .filter(|w| !QUALIFIERS.contains(w))
            .collect();

        let (type_name, name) = match words.as_slice() {
            [type_name, name] => (*type_name, *name),
            _ => {
                log::warn!("Skipping unrecognized statement at line {}: {}", line_num, line);
                return self.skip_attached_block();
            }
        };

        // Parse the value and any trailing metadata block
        let mut raw = None;
        let mut metadata = Vec::new();
        if let Some(rhs) = rhs {
            let mut reader = ValueReader::new(rhs);
            if reader.is_at_end() {
                // Value is a block (timeSamples, dictionary)
                log::debug!("Skipping block value of {}.{} at line {}", path, name, line_num);
                return self.skip_attached_block();
            }
            raw = Some(reader.value().map_err(|m| {
                self.error(line_num, format!("Invalid value for {}: {}", name, m))
            })?);
            reader.skip_ws();
            if reader.peek() == Some('(') {
                metadata = parse_metadata_block(&mut reader).map_err(|m| self.error(line_num, m))?;
            }
        } else if let Some(paren) = line.find('(') {
            let mut reader = ValueReader::new(&line[paren..]);
            metadata = parse_metadata_block(&mut reader).map_err(|m| self.error(line_num, m))?;
        }

        if name.ends_with(".timeSamples") || name.ends_with(".spline") {
            log::debug!("Animation on {}.{} is not evaluated", path, name);
            return Ok(());
        }

        if type_name == "rel" {
            let targets = raw.as_ref().map(path_targets).unwrap_or_default();
            spec.relationships.insert(name.to_string(), targets);
            return Ok(());
        }

        if let Some(base) = name.strip_suffix(".connect") {
            let targets = raw.as_ref().map(path_targets).unwrap_or_default();
            let attr = spec
                .attributes
                .entry(base.to_string())
                .or_insert_with(|| Attribute::new(type_name, None));
            attr.connections = targets;
            return Ok(());
        }

        if name == "xformOpOrder" {
            let order = raw
                .as_ref()
                .map(|r| r.items().into_iter().filter_map(|v| v.as_text()).collect())
                .unwrap_or_default();
            spec.xform_op_order = Some(order);
            return Ok(());
        }

        if name.starts_with("xformOp:") {
            match raw.as_ref().and_then(|r| parse_xform_op(name, r)) {
                Some(op) => {
                    spec.xform_ops.retain(|existing| existing.name != name);
                    spec.xform_ops.push(XformOpSpec {
                        name: name.to_string(),
                        op,
                    });
                    return Ok(());
                }
                None => log::warn!("Unsupported xformOp {} on {}", name, path),
            }
        }

        let value = raw.as_ref().and_then(|r| to_attribute_value(type_name, r));
        if raw.is_some() && value.is_none() {
            log::debug!("Value of {}.{} ({}) is not supported", path, name, type_name);
        }

        let attr = spec
            .attributes
            .entry(name.to_string())
            .or_insert_with(|| Attribute::new(type_name, None));
        attr.type_name = type_name.to_string();
        if value.is_some() {
            attr.value = value;
        }
        for entry in metadata {
            if entry.key == "interpolation" {
                attr.interpolation = entry.value.as_text();
            }
        }

        Ok(())
    }

    /// Expect and consume an opening brace.
    fn expect_opening_brace(&mut self, start_line: usize) -> ParseResult<()> {
        match self.lines.front() {
            Some((_, line)) if line == "{" => {
                self.lines.pop_front();
                Ok(())
            }
            Some((num, line)) => Err(self.error(*num, format!("Expected '{{', found: {}", line))),
            None => Err(ParseError::UnclosedBlock(start_line)),
        }
    }

    /// Skip a block whose opening brace was already consumed.
    fn skip_block(&mut self, start_line: usize) -> ParseResult<()> {
        let mut depth = 1;

        while depth > 0 {
            match self.lines.pop_front() {
                Some((_, line)) if line == "{" => depth += 1,
                Some((_, line)) if line == "}" => depth -= 1,
                Some(_) => {}
                None => return Err(ParseError::UnclosedBlock(start_line)),
            }
        }

        Ok(())
    }

    /// Skip the block following the current statement, if there is one.
    fn skip_attached_block(&mut self) -> ParseResult<()> {
        if matches!(self.lines.front(), Some((_, line)) if line == "{") {
            let start = self.current_line;
            self.lines.pop_front();
            self.skip_block(start)?;
        }
        Ok(())
    }

    fn metadata_from(&self, text: &str, line_num: usize) -> ParseResult<Vec<MetadataEntry>> {
        let mut reader = ValueReader::new(text);
        parse_metadata_block(&mut reader).map_err(|m| self.error(line_num, m))
    }
}

/// Parse a USDA string into a layer.
pub fn parse_usda(content: &str) -> ParseResult<UsdLayer> {
    let mut parser = UsdaParser::new(content);
    parser.parse()
}

fn is_prim_header(line: &str) -> bool {
    ["def", "over", "class"].iter().any(|kw| {
        line.strip_prefix(kw)
            .map(|rest| rest.starts_with(char::is_whitespace) || rest.starts_with('"'))
            .unwrap_or(false)
    })
}

fn child_path(parent_path: &str, name: &str) -> String {
    format!("{}/{}", parent_path, name)
}

/// Split `lhs = rhs` at the first `=` outside quotes and brackets.
fn split_assignment(line: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') | (None, '[') => depth += 1,
            (None, ')') | (None, ']') => depth -= 1,
            (None, '=') if depth == 0 => return (&line[..i], Some(&line[i + 1..])),
            _ => {}
        }
    }
    let lhs = match line.find('(') {
        Some(paren) => &line[..paren],
        None => line,
    };
    (lhs, None)
}

fn path_targets(raw: &RawValue) -> Vec<String> {
    raw.items()
        .into_iter()
        .filter_map(|v| match v {
            RawValue::Path(p) => Some(p.clone()),
            _ => None,
        })
        .collect()
}

fn vec3(raw: &RawValue) -> Option<DVec3> {
    match raw.flatten_numbers()?.as_slice() {
        [x, y, z] => Some(DVec3::new(*x, *y, *z)),
        [s] => Some(DVec3::splat(*s)),
        _ => None,
    }
}

/// Build an xformOp from its attribute name and literal.
fn parse_xform_op(name: &str, raw: &RawValue) -> Option<XformOp> {
    let kind = name.strip_prefix("xformOp:")?.split(':').next()?;
    match kind {
        "translate" => vec3(raw).map(XformOp::Translate),
        "scale" => vec3(raw).map(XformOp::Scale),
        "rotateX" => raw.as_f64().map(XformOp::RotateX),
        "rotateY" => raw.as_f64().map(XformOp::RotateY),
        "rotateZ" => raw.as_f64().map(XformOp::RotateZ),
        "orient" => match raw.flatten_numbers()?.as_slice() {
            // USD quaternion literals are (real, i, j, k)
            [w, x, y, z] => Some(XformOp::Orient(DQuat::from_xyzw(*x, *y, *z, *w))),
            _ => None,
        },
        "transform" => {
            let numbers = raw.flatten_numbers()?;
            let cols: [f64; 16] = numbers.try_into().ok()?;
            Some(XformOp::Transform(DMat4::from_cols_array(&cols)))
        }
        k if k.len() == 9 && k.starts_with("rotate") => {
            let mut order = [Axis::X; 3];
            for (slot, c) in order.iter_mut().zip(k[6..].chars()) {
                *slot = match c {
                    'X' => Axis::X,
                    'Y' => Axis::Y,
                    'Z' => Axis::Z,
                    _ => return None,
                };
            }
            vec3(raw).map(|degrees| XformOp::RotateEuler { order, degrees })
        }
        _ => None,
    }
}

/// Parse a parenthesized metadata block; the reader must be at `(`.
fn parse_metadata_block(reader: &mut ValueReader) -> Result<Vec<MetadataEntry>, String> {
    if !reader.eat('(') {
        return Err("expected '('".to_string());
    }

    let mut entries = Vec::new();
    loop {
        reader.skip_separators();
        match reader.peek() {
            Some(')') => {
                reader.eat(')');
                return Ok(entries);
            }
            None => return Err("unterminated metadata block".to_string()),
            Some('"') | Some('\'') => {
                let doc = reader.string()?;
                entries.push(MetadataEntry {
                    key: "doc".to_string(),
                    value: RawValue::Str(doc),
                });
                continue;
            }
            _ => {}
        }

        let mut key = reader
            .word()
            .ok_or_else(|| format!("expected metadata key near '{}'", reader.rest()))?;
        if QUALIFIERS.contains(&key) {
            key = reader
                .word()
                .ok_or_else(|| "expected metadata key after list op".to_string())?;
        }
        let key = key.to_string();
        if !reader.eat('=') {
            return Err(format!("expected '=' after metadata key '{}'", key));
        }
        let value = reader.value()?;
        entries.push(MetadataEntry { key, value });
    }
}

fn apply_layer_metadata(meta: &mut LayerMetadata, entries: Vec<MetadataEntry>) {
    for entry in entries {
        match entry.key.as_str() {
            "upAxis" => meta.up_axis = entry.value.as_text(),
            "metersPerUnit" => meta.meters_per_unit = entry.value.as_f64(),
            "defaultPrim" => meta.default_prim = entry.value.as_text(),
            "doc" | "documentation" => meta.documentation = entry.value.as_text(),
            _ => {}
        }
    }
}

fn apply_prim_metadata(meta: &mut PrimMetadata, entries: Vec<MetadataEntry>) {
    for entry in entries {
        match entry.key.as_str() {
            "variants" => {
                if let RawValue::Dict(selections) = entry.value {
                    for selection in selections {
                        if let Some(option) = selection.value.as_text() {
                            meta.variant_selection.insert(selection.key, option);
                        }
                    }
                }
            }
            "kind" => meta.kind = entry.value.as_text(),
            "active" => meta.active = entry.value.as_bool(),
            "apiSchemas" => {
                meta.api_schemas = entry
                    .value
                    .items()
                    .into_iter()
                    .filter_map(|v| v.as_text())
                    .collect();
            }
            "references" | "payload" => {
                for item in entry.value.items() {
                    if let Some(reference) = item.as_text() {
                        log::warn!(
                            "Composition arc {} = {} is recorded but not resolved",
                            entry.key,
                            reference
                        );
                        meta.references.push(reference);
                    }
                }
            }
            "doc" | "documentation" => meta.documentation = entry.value.as_text(),
            _ => {}
        }
    }
}

/// Normalize source text into logical statements.
///
/// Comments are stripped, `{` and `}` outside of values become statements of
/// their own, and statements with open brackets continue onto following lines.
fn split_statements(content: &str) -> VecDeque<(usize, String)> {
    let mut out = VecDeque::new();
    let mut current = String::new();
    let mut start_line = 0;
    let mut depth = 0i32;
    // Open quote character and whether it is tripled
    let mut quote: Option<(char, bool)> = None;

    fn flush(out: &mut VecDeque<(usize, String)>, current: &mut String, line: usize) {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            out.push_back((line, trimmed.to_string()));
        }
        current.clear();
    }

    for (i, raw_line) in content.lines().enumerate() {
        let line_num = i + 1;
        let chars: Vec<char> = raw_line.chars().collect();
        let mut j = 0;

        while j < chars.len() {
            let c = chars[j];

            if let Some((q, triple)) = quote {
                current.push(c);
                j += 1;
                if c == '\\' && q != '@' && !triple {
                    if let Some(&escaped) = chars.get(j) {
                        current.push(escaped);
                        j += 1;
                    }
                } else if c == q {
                    if !triple {
                        quote = None;
                    } else if chars.get(j) == Some(&q) && chars.get(j + 1) == Some(&q) {
                        current.push(q);
                        current.push(q);
                        j += 2;
                        quote = None;
                    }
                }
                continue;
            }

            if current.trim().is_empty() && !c.is_whitespace() {
                start_line = line_num;
            }

            match c {
                '#' => break,
                '"' | '\'' | '@' => {
                    let triple = chars.get(j + 1) == Some(&c) && chars.get(j + 2) == Some(&c);
                    let width = if triple { 3 } else { 1 };
                    current.extend(std::iter::repeat(c).take(width));
                    j += width;
                    quote = Some((c, triple));
                    continue;
                }
                '(' | '[' => depth += 1,
                ')' | ']' => depth = (depth - 1).max(0),
                '{' | '}' if depth == 0 => {
                    flush(&mut out, &mut current, start_line);
                    out.push_back((line_num, c.to_string()));
                    j += 1;
                    continue;
                }
                _ => {}
            }

            current.push(c);
            j += 1;
        }

        if quote.is_some() || depth > 0 {
            current.push('\n');
        } else {
            flush(&mut out, &mut current, start_line);
        }
    }

    flush(&mut out, &mut current, start_line);
    out
}
