use std::collections::HashMap;
use std::path::Path;

use drive2docs_core::FOLDER_MIME_TYPE;

pub const OCTET_STREAM: &str = "application/octet-stream";

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const PDF: &str = "application/pdf";
const PNG: &str = "image/png";
const SVG: &str = "image/svg+xml";

const BUILTIN_EXTENSIONS: &[(&str, &str)] = &[
    (DOCX, "docx"),
    (XLSX, "xlsx"),
    (PPTX, "pptx"),
    ("application/vnd.oasis.opendocument.text", "odt"),
    ("application/x-vnd.oasis.opendocument.spreadsheet", "ods"),
    ("application/vnd.oasis.opendocument.presentation", "odp"),
    (PDF, "pdf"),
    (PNG, "png"),
    (SVG, "svg"),
];

const BUILTIN_EXPORTS: &[(&str, &[&str])] = &[
    (FOLDER_MIME_TYPE, &[]),
    ("application/vnd.google-apps.document", &[DOCX, PDF]),
    ("application/vnd.google-apps.spreadsheet", &[XLSX]),
    ("application/vnd.google-apps.drawing", &[PNG, SVG]),
    ("application/vnd.google-apps.presentation", &[PPTX, PDF]),
];

/// Content-type to file extension table, queryable in both directions.
#[derive(Debug, Clone)]
pub struct MimeTable {
    extension_by_type: HashMap<String, String>,
    type_by_extension: HashMap<String, String>,
}

impl Default for MimeTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (content_type, extension) in BUILTIN_EXTENSIONS {
            table.insert(content_type, extension);
        }
        table
    }
}

impl MimeTable {
    pub fn empty() -> Self {
        Self {
            extension_by_type: HashMap::new(),
            type_by_extension: HashMap::new(),
        }
    }

    /// Applies `extension -> content type` entries over the current table.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (extension, content_type) in overrides {
            self.insert(content_type, extension);
        }
        self
    }

    /// Later entries replace earlier ones in both directions.
    pub fn insert(&mut self, content_type: &str, extension: &str) {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if let Some(old_extension) = self.extension_by_type.remove(content_type) {
            self.type_by_extension.remove(&old_extension);
        }
        if let Some(old_type) = self.type_by_extension.remove(&extension) {
            self.extension_by_type.remove(&old_type);
        }
        self.extension_by_type
            .insert(content_type.to_string(), extension.clone());
        self.type_by_extension
            .insert(extension, content_type.to_string());
    }

    pub fn extension_for(&self, content_type: &str) -> Option<&str> {
        self.extension_by_type.get(content_type).map(String::as_str)
    }

    pub fn content_type_for_extension(&self, extension: &str) -> Option<&str> {
        self.type_by_extension
            .get(&extension.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type_for_path(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.content_type_for_extension(ext))
            .unwrap_or(OCTET_STREAM)
    }
}

/// Native content type to ordered export content types.
#[derive(Debug, Clone)]
pub struct ExportTable {
    entries: HashMap<String, Vec<String>>,
}

impl Default for ExportTable {
    fn default() -> Self {
        let entries = BUILTIN_EXPORTS
            .iter()
            .map(|(native, targets)| {
                (
                    native.to_string(),
                    targets.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect();
        Self { entries }
    }
}

impl ExportTable {
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<String>)>,
    {
        for (native, targets) in overrides {
            self.entries.insert(native.clone(), targets.clone());
        }
        self
    }

    pub fn get(&self, native: &str) -> Option<&[String]> {
        self.entries.get(native).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub content_type: String,
    /// Copy the stored bytes instead of asking the source for a rendering.
    pub verbatim: bool,
}

impl Representation {
    pub fn verbatim(content_type: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            verbatim: true,
        }
    }

    pub fn export(content_type: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            verbatim: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportSelector {
    exports: ExportTable,
    mime: MimeTable,
}

impl ExportSelector {
    pub fn new(exports: ExportTable, mime: MimeTable) -> Self {
        Self { exports, mime }
    }

    /// Empty for containers, one verbatim copy for types the table does not know.
    pub fn representations(&self, native_content_type: &str) -> Vec<Representation> {
        match self.exports.get(native_content_type) {
            Some(targets) => targets
                .iter()
                .map(|target| Representation::export(target))
                .collect(),
            None => vec![Representation::verbatim(native_content_type)],
        }
    }

    /// `None` when an export target has no known extension.
    pub fn file_name(&self, display_name: &str, representation: &Representation) -> Option<String> {
        let name = sanitize_file_name(display_name);
        if representation.verbatim {
            return Some(name);
        }
        let extension = self.mime.extension_for(&representation.content_type)?;
        Some(with_extension(&name, extension))
    }
}

pub fn sanitize_file_name(name: &str) -> String {
    name.replace('/', "-")
}

pub fn with_extension(name: &str, extension: &str) -> String {
    let suffix = format!(".{extension}");
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}
