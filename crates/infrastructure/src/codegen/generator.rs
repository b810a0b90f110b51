//! Snippet generators for HAR requests.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::har::{HarPostData, HarRequest};

/// Target language of a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    /// Shell `curl`.
    Curl,
    /// Python `requests`.
    Python,
    /// JavaScript `fetch`.
    JavaScript,
    /// Rust `reqwest`.
    Rust,
}

impl CodeLanguage {
    /// Every supported language.
    pub const ALL: [Self; 4] = [Self::Curl, Self::Python, Self::JavaScript, Self::Rust];

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
        }
    }
}

impl fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "curl" | "shell" => Ok(Self::Curl),
            "python" | "py" => Ok(Self::Python),
            "javascript" | "js" | "fetch" => Ok(Self::JavaScript),
            "rust" | "reqwest" => Ok(Self::Rust),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Generated code plus the imports it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnippet {
    /// Language.
    pub language: CodeLanguage,
    /// Snippet body.
    pub code: String,
    /// Import lines, in order.
    pub imports: Vec<String>,
}

impl CodeSnippet {
    fn new(language: CodeLanguage, code: String) -> Self {
        Self {
            language,
            code,
            imports: Vec::new(),
        }
    }

    fn with_import(mut self, import: &str) -> Self {
        self.imports.push(import.to_string());
        self
    }

    /// Imports followed by the code.
    #[must_use]
    pub fn render(&self) -> String {
        if self.imports.is_empty() {
            return self.code.clone();
        }
        format!("{}\n\n{}", self.imports.join("\n"), self.code)
    }
}

const INDENT: &str = "    ";

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

fn double_quoted(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r");
    format!("\"{escaped}\"")
}

fn body_text(post: Option<&HarPostData>) -> Option<&str> {
    post.and_then(|p| p.text.as_deref())
}

/// Renders `request` as a snippet in `language`.
#[must_use]
pub fn generate_snippet(request: &HarRequest, language: CodeLanguage) -> CodeSnippet {
    match language {
        CodeLanguage::Curl => curl(request),
        CodeLanguage::Python => python(request),
        CodeLanguage::JavaScript => fetch(request),
        CodeLanguage::Rust => rust(request),
    }
}

fn curl(request: &HarRequest) -> CodeSnippet {
    let mut parts = vec!["curl".to_string()];
    if request.method != "GET" {
        parts.push(format!("-X {}", request.method));
    }
    parts.push(shell_quote(&request.url));
    for header in &request.headers {
        parts.push(format!("-H {}", shell_quote(&format!("{}: {}", header.name, header.value))));
    }
    if let Some(post) = &request.post_data {
        if let Some(text) = &post.text {
            parts.push(format!("--data-raw {}", shell_quote(text)));
        } else {
            for param in &post.params {
                let value = match (&param.file_name, &param.value) {
                    (Some(file), _) => format!("{}=@{file}", param.name),
                    (None, value) => format!("{}={}", param.name, value.as_deref().unwrap_or_default()),
                };
                parts.push(format!("-F {}", shell_quote(&value)));
            }
        }
    }
    CodeSnippet::new(CodeLanguage::Curl, parts.join(" \\\n  "))
}

fn python(request: &HarRequest) -> CodeSnippet {
    let mut code = String::new();
    let _ = writeln!(code, "url = {}", double_quoted(&request.url));
    if !request.headers.is_empty() {
        code.push_str("headers = {\n");
        for header in &request.headers {
            let _ = writeln!(code, "{INDENT}{}: {},", double_quoted(&header.name), double_quoted(&header.value));
        }
        code.push_str("}\n");
    }

    let mut arguments = vec!["url".to_string()];
    if !request.headers.is_empty() {
        arguments.push("headers=headers".to_string());
    }
    if let Some(post) = &request.post_data {
        if let Some(text) = &post.text {
            let _ = writeln!(code, "payload = {}", double_quoted(text));
            arguments.push("data=payload".to_string());
        } else if !post.params.is_empty() {
            code.push_str("files = {\n");
            for param in &post.params {
                let value = match (&param.file_name, &param.value) {
                    (Some(file), _) => format!("open({}, \"rb\")", double_quoted(file)),
                    (None, value) => format!("(None, {})", double_quoted(value.as_deref().unwrap_or_default())),
                };
                let _ = writeln!(code, "{INDENT}{}: {value},", double_quoted(&param.name));
            }
            code.push_str("}\n");
            arguments.push("files=files".to_string());
        }
    }
    let _ = writeln!(
        code,
        "\nresponse = requests.request({}, {})\n\nprint(response.status_code)\nprint(response.text)",
        double_quoted(&request.method),
        arguments.join(", ")
    );
    CodeSnippet::new(CodeLanguage::Python, code.trim_end().to_string()).with_import("import requests")
}

fn fetch(request: &HarRequest) -> CodeSnippet {
    let mut code = String::new();
    let multipart = request
        .post_data
        .as_ref()
        .is_some_and(|post| post.text.is_none() && !post.params.is_empty());
    if let Some(post) = request.post_data.as_ref().filter(|_| multipart) {
        code.push_str("const form = new FormData();\n");
        for param in &post.params {
            match (&param.file_name, &param.value) {
                (Some(file), _) => {
                    let _ = writeln!(code, "form.append({}, fileInput /* {file} */);", double_quoted(&param.name));
                }
                (None, value) => {
                    let _ = writeln!(
                        code,
                        "form.append({}, {});",
                        double_quoted(&param.name),
                        double_quoted(value.as_deref().unwrap_or_default())
                    );
                }
            }
        }
        code.push('\n');
    }

    let _ = writeln!(code, "const response = await fetch({}, {{", double_quoted(&request.url));
    let _ = writeln!(code, "{INDENT}method: {},", double_quoted(&request.method));
    if !request.headers.is_empty() {
        let _ = writeln!(code, "{INDENT}headers: {{");
        for header in &request.headers {
            let _ = writeln!(
                code,
                "{INDENT}{INDENT}{}: {},",
                double_quoted(&header.name),
                double_quoted(&header.value)
            );
        }
        let _ = writeln!(code, "{INDENT}}},");
    }
    if multipart {
        let _ = writeln!(code, "{INDENT}body: form,");
    } else if let Some(text) = body_text(request.post_data.as_ref()) {
        let _ = writeln!(code, "{INDENT}body: {},", double_quoted(text));
    }
    code.push_str("});\n\nconsole.log(response.status);\nconsole.log(await response.text());");
    CodeSnippet::new(CodeLanguage::JavaScript, code)
}

fn rust(request: &HarRequest) -> CodeSnippet {
    let mut code = String::from("let client = reqwest::Client::new();\n");
    let _ = writeln!(
        code,
        "let response = client\n{INDENT}.request(reqwest::Method::from_bytes(b{})?, {})",
        double_quoted(&request.method),
        double_quoted(&request.url)
    );
    for header in &request.headers {
        let _ = writeln!(
            code,
            "{INDENT}.header({}, {})",
            double_quoted(&header.name),
            double_quoted(&header.value)
        );
    }
    if let Some(text) = body_text(request.post_data.as_ref()) {
        let _ = writeln!(code, "{INDENT}.body({})", double_quoted(text));
    }
    let _ = writeln!(code, "{INDENT}.send()\n{INDENT}.await?;\n");
    code.push_str("println!(\"{}\", response.status());\nprintln!(\"{}\", response.text().await?);");
    CodeSnippet::new(CodeLanguage::Rust, code)
}
