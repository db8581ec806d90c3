//! Section prompt templates.
//!
//! A template is plain text with `{name}` placeholders; `{{` and `}}` are
//! literal braces. Each section has one template named
//! `{section}_prompt.txt`, served either from the binary or from a directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tpforge_core::error::TemplateError;
use tpforge_core::section::SectionName;

/// Variables available to a template fill.
pub type TemplateVars = BTreeMap<String, String>;

/// Source of section templates.
pub trait TemplateStore: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, section: SectionName) -> Result<String, TemplateError>;
}

/// File name of a section's template.
pub fn template_file_name(section: SectionName) -> String {
    format!("{}_prompt.txt", section.as_str())
}

/// Templates compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTemplates;

impl BuiltinTemplates {
    pub fn source(section: SectionName) -> &'static str {
        match section {
            SectionName::ExecutiveSummary => {
                include_str!("../templates/executive_summary_prompt.txt")
            }
            SectionName::RelatedParties => include_str!("../templates/related_parties_prompt.txt"),
            SectionName::FunctionalAnalysis => {
                include_str!("../templates/functional_analysis_prompt.txt")
            }
            SectionName::ComparabilityAnalysis => {
                include_str!("../templates/comparability_analysis_prompt.txt")
            }
            SectionName::MethodSelection => {
                include_str!("../templates/method_selection_prompt.txt")
            }
            SectionName::Benchmarking => include_str!("../templates/benchmarking_prompt.txt"),
            SectionName::DocumentationRequirements => {
                include_str!("../templates/documentation_requirements_prompt.txt")
            }
        }
    }

    /// Write every built-in template into `dir`, skipping files that exist.
    /// Returns the number of files written.
    pub fn write_to(dir: &Path) -> std::io::Result<usize> {
        std::fs::create_dir_all(dir)?;
        let mut written = 0;
        for section in SectionName::ALL {
            let path = dir.join(template_file_name(section));
            if path.exists() {
                continue;
            }
            std::fs::write(&path, Self::source(section))?;
            written += 1;
        }
        Ok(written)
    }
}

impl TemplateStore for BuiltinTemplates {
    fn name(&self) -> &str {
        "builtin"
    }

    fn load(&self, section: SectionName) -> Result<String, TemplateError> {
        Ok(Self::source(section).to_string())
    }
}

/// Templates read from `{dir}/{section}_prompt.txt` on every load, so edits
/// take effect without a restart.
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    dir: PathBuf,
}

impl FileTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TemplateStore for FileTemplateStore {
    fn name(&self) -> &str {
        "files"
    }

    fn load(&self, section: SectionName) -> Result<String, TemplateError> {
        let path = self.dir.join(template_file_name(section));
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TemplateError::NotFound {
                name: path.display().to_string(),
            },
            _ => TemplateError::Io {
                name: path.display().to_string(),
                reason: e.to_string(),
            },
        })
    }
}

enum Piece<'a> {
    Text(&'a str),
    Var(&'a str),
}

/// Split a template into literal text and placeholder names.
fn parse<'a>(name: &str, template: &'a str) -> Result<Vec<Piece<'a>>, TemplateError> {
    let malformed = |offset: usize, reason: &str| TemplateError::Malformed {
        template: name.to_string(),
        offset,
        reason: reason.to_string(),
    };

    let bytes = template.as_bytes();
    let mut pieces = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                pieces.push(Piece::Text(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                pieces.push(Piece::Text(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let close = template[i + 1..]
                    .find('}')
                    .map(|rel| i + 1 + rel)
                    .ok_or_else(|| malformed(i, "unclosed '{'"))?;
                let var = &template[i + 1..close];
                if var.is_empty() || !var.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(malformed(i, "placeholder must be an identifier"));
                }
                pieces.push(Piece::Text(&template[literal_start..i]));
                pieces.push(Piece::Var(var));
                i = close + 1;
                literal_start = i;
            }
            b'}' => return Err(malformed(i, "unmatched '}'")),
            _ => i += 1,
        }
    }
    pieces.push(Piece::Text(&template[literal_start..]));
    Ok(pieces)
}

/// Fill `template` with `vars`.
///
/// `name` is only used in error messages. Every placeholder must have a
/// value; unused variables are fine.
pub fn render(name: &str, template: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len() * 2);
    for piece in parse(name, template)? {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Var(var) => {
                let value = vars.get(var).ok_or_else(|| TemplateError::UnresolvedVariable {
                    template: name.to_string(),
                    variable: var.to_string(),
                })?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// Distinct placeholder names in `template`, in first-use order.
pub fn placeholders(name: &str, template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for piece in parse(name, template)? {
        if let Piece::Var(var) = piece
            && !names.iter().any(|n| n == var)
        {
            names.push(var.to_string());
        }
    }
    Ok(names)
}
