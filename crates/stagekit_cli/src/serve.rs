//! Line-delimited JSON tool calls over stdin/stdout.
//!
//! Each input line is one request:
//!
//! ```text
//! {"id": 1, "tool": "set_variant", "args": {"path": "product.usda", "prim_path": "/Product", "variant_set": "color", "variant": "blue"}}
//! ```
//!
//! and produces exactly one output line, either
//! `{"id": 1, "ok": true, "result": {...}}` or
//! `{"id": 1, "ok": false, "error": {"code": "...", "message": "..."}}`.
//! Tool names may carry a `usd_` prefix.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagekit_core::{ExportFormat, SceneError, SceneTools};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

/// Error payload of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
}

impl ToolError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "bad_request".to_string(),
            message: message.into(),
        }
    }
}

impl From<SceneError> for ToolError {
    fn from(err: SceneError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SceneArgs {
    path: PathBuf,
}

#[derive(Deserialize)]
struct PrimArgs {
    path: PathBuf,
    prim_path: String,
}

#[derive(Deserialize)]
struct MaybePrimArgs {
    path: PathBuf,
    #[serde(default)]
    prim_path: Option<String>,
}

#[derive(Deserialize)]
struct SetVariantArgs {
    path: PathBuf,
    prim_path: String,
    variant_set: String,
    variant: String,
}

#[derive(Deserialize)]
struct ExportArgs {
    path: PathBuf,
    prim_path: String,
    output: PathBuf,
    #[serde(default)]
    format: Option<String>,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args)
        .map_err(|e| ToolError::bad_request(format!("invalid arguments: {e}")))
}

fn to_value<T: Serialize>(result: Result<T, SceneError>) -> Result<Value, ToolError> {
    let result = result?;
    serde_json::to_value(result).map_err(|e| ToolError {
        code: "internal".to_string(),
        message: e.to_string(),
    })
}

/// Run one tool call.
pub fn dispatch(tools: &SceneTools, tool: &str, args: Value) -> Result<Value, ToolError> {
    let name = tool.strip_prefix("usd_").unwrap_or(tool);
    match name {
        "inspect" => {
            let a: SceneArgs = parse_args(args)?;
            to_value(tools.inspect(&a.path))
        }
        "get_prim" => {
            let a: PrimArgs = parse_args(args)?;
            to_value(tools.get_prim(&a.path, &a.prim_path))
        }
        "get_materials" => {
            let a: SceneArgs = parse_args(args)?;
            to_value(tools.get_materials(&a.path))
        }
        "get_transforms" => {
            let a: MaybePrimArgs = parse_args(args)?;
            to_value(tools.get_transforms(&a.path, a.prim_path.as_deref()))
        }
        "list_variants" => {
            let a: MaybePrimArgs = parse_args(args)?;
            to_value(tools.list_variants(&a.path, a.prim_path.as_deref()))
        }
        "set_variant" => {
            let a: SetVariantArgs = parse_args(args)?;
            to_value(tools.set_variant(&a.path, &a.prim_path, &a.variant_set, &a.variant))
        }
        "export_mesh" => {
            let a: ExportArgs = parse_args(args)?;
            let format = a
                .format
                .as_deref()
                .map(str::parse::<ExportFormat>)
                .transpose()?;
            to_value(tools.export_mesh(&a.path, &a.prim_path, &a.output, format))
        }
        "scene_stats" => {
            let a: SceneArgs = parse_args(args)?;
            to_value(tools.scene_stats(&a.path))
        }
        _ => Err(ToolError {
            code: "unknown_tool".to_string(),
            message: format!("Unknown tool: {tool}"),
        }),
    }
}

/// Answer one request line.
pub fn handle_line(tools: &SceneTools, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Response {
                id: Value::Null,
                ok: false,
                result: None,
                error: Some(ToolError::bad_request(format!("malformed request: {e}"))),
            }
        }
    };

    log::debug!("Tool call {} ({})", request.tool, request.id);
    match dispatch(tools, &request.tool, request.args) {
        Ok(result) => Response {
            id: request.id,
            ok: true,
            result: Some(result),
            error: None,
        },
        Err(error) => {
            log::warn!("{} failed: {}", request.tool, error.message);
            Response {
                id: request.id,
                ok: false,
                result: None,
                error: Some(error),
            }
        }
    }
}

/// Serve requests from `input` until it closes.
pub fn serve(tools: &SceneTools, input: impl BufRead, mut output: impl Write) -> Result<()> {
    log::info!("Serving tool calls on stdio");
    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(tools, &line);
        serde_json::to_writer(&mut output, &response).context("Failed to encode response")?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PRODUCT: &str = r#"#usda 1.0

def Xform "Product" (
    variants = {
        string color = "red"
    }
)
{
    variantSet "color" = {
        "red" {
            def Mesh "Cap"
            {
                point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]
                int[] faceVertexCounts = [3]
                int[] faceVertexIndices = [0, 1, 2]
            }
        }
        "blue" {
        }
    }
}
"#;

    fn scene() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("product.usda");
        std::fs::write(&path, PRODUCT).unwrap();
        let path = path.to_string_lossy().into_owned();
        (dir, path)
    }

    fn run(tools: &SceneTools, requests: &[Value]) -> Vec<Value> {
        let input: String = requests.iter().map(|r| format!("{r}\n")).collect();
        let mut output = Vec::new();
        serve(tools, input.as_bytes(), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_selection_persists_across_calls() {
        let (_dir, path) = scene();
        let tools = SceneTools::default();
        let responses = run(
            &tools,
            &[
                json!({"id": 1, "tool": "scene_stats", "args": {"path": path}}),
                json!({"id": 2, "tool": "set_variant", "args": {"path": path, "prim_path": "/Product", "variant_set": "color", "variant": "blue"}}),
                json!({"id": 3, "tool": "usd_scene_stats", "args": {"path": path}}),
            ],
        );

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["result"]["mesh_count"], 1);
        assert_eq!(responses[1]["ok"], true);
        assert_eq!(responses[1]["result"]["previous"], "red");
        assert_eq!(responses[2]["id"], 3);
        assert_eq!(responses[2]["result"]["mesh_count"], 0);
        assert_eq!(responses[2]["result"]["bounds"], Value::Null);
    }

    #[test]
    fn test_error_responses() {
        let (_dir, path) = scene();
        let tools = SceneTools::default();
        let responses = run(
            &tools,
            &[
                json!({"id": "a", "tool": "set_variant", "args": {"path": path, "prim_path": "/Product", "variant_set": "color", "variant": "green"}}),
                json!({"id": "b", "tool": "export_mesh", "args": {"path": path, "prim_path": "/Product/Cap", "output": "/tmp/x.gltf", "format": "gltf"}}),
                json!({"id": "c", "tool": "get_prim", "args": {"path": path}}),
                json!({"id": "d", "tool": "render"}),
            ],
        );

        let codes: Vec<&str> = responses
            .iter()
            .map(|r| r["error"]["code"].as_str().unwrap())
            .collect();
        assert_eq!(
            codes,
            vec!["unknown_variant_option", "unsupported_format", "bad_request", "unknown_tool"]
        );
        assert!(responses.iter().all(|r| r["ok"] == false));
        assert_eq!(responses[0]["id"], "a");
    }

    #[test]
    fn test_malformed_line() {
        let tools = SceneTools::default();
        let response = handle_line(&tools, "{not json");
        assert!(!response.ok);
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error.unwrap().code, "bad_request");
    }

    #[test]
    fn test_export_call() {
        let (dir, path) = scene();
        let output = dir.path().join("cap.stl");
        let tools = SceneTools::default();
        let result = dispatch(
            &tools,
            "export_mesh",
            json!({"path": path, "prim_path": "/Product/Cap", "output": output}),
        )
        .unwrap();

        assert_eq!(result["format"], "stl");
        assert_eq!(result["triangles"], 1);
        assert_eq!(result["size_bytes"], 134);
        assert!(output.exists());
    }
}
