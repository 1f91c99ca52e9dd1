//! Guest program generation.
//!
//! The synthesized program is plain Python text: a fixed preamble that loads
//! the precompiled library module, followed by the request parameters. All
//! host text enters the program as escaped string literals, so no input can
//! close a literal early or inject statements.

use std::collections::BTreeSet;
use std::fmt;

use cloudbridge_config::{AssetsSection, RenderSection, SandboxSection};

/// Class the library module exposes.
const MANAGER_CLASS: &str = "CloudManager";

/// Build call that renders the cloud and writes the output file.
const BUILD_CALL: &str = "make_wordcloud_base64";

/// Local binding for the loaded module. Staged file names need not be
/// identifiers.
const MODULE_BINDING: &str = "_module";

/// Variable the build call's return value is assigned to.
pub const OUTPUT_VARIABLE: &str = "output";

/// Rendering parameters applied to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub background_color: String,
    /// File name of a staged font.
    pub font: String,
    pub stopwords: BTreeSet<String>,
    pub max_words: u32,
    /// File name the guest writes the PNG to.
    pub output: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&RenderSection::default())
    }
}

impl From<&RenderSection> for RenderSettings {
    fn from(section: &RenderSection) -> Self {
        Self {
            background_color: section.background_color.clone(),
            font: section.font.clone(),
            stopwords: section.stopwords.iter().cloned().collect(),
            max_words: section.max_words,
            output: section.output.clone(),
        }
    }
}

impl RenderSettings {
    /// Output name without its `.png` extension; the library appends it.
    pub fn output_stem(&self) -> &str {
        self.output.strip_suffix(".png").unwrap_or(&self.output)
    }
}

/// Where things live inside the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestLayout {
    /// Guest path of the private filesystem.
    pub workdir: String,
    /// Staged file name of the precompiled module.
    pub module_file: String,
}

impl Default for GuestLayout {
    fn default() -> Self {
        Self::from_config(&SandboxSection::default(), &AssetsSection::default())
    }
}

impl GuestLayout {
    pub fn from_config(sandbox: &SandboxSection, assets: &AssetsSection) -> Self {
        Self {
            workdir: sandbox.workdir.clone(),
            module_file: assets.module.target.clone(),
        }
    }

    /// Name the module is registered under: the file name up to the first dot.
    pub fn module_name(&self) -> &str {
        self.module_file
            .split('.')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("cloud")
    }
}

/// Generated guest source for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestProgram {
    source: String,
}

impl GuestProgram {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn into_source(self) -> String {
        self.source
    }
}

impl fmt::Display for GuestProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Builds [`GuestProgram`]s from request text.
#[derive(Debug, Clone, Default)]
pub struct ProgramSynthesizer {
    settings: RenderSettings,
    layout: GuestLayout,
}

impl ProgramSynthesizer {
    pub fn new(settings: RenderSettings, layout: GuestLayout) -> Self {
        Self { settings, layout }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn layout(&self) -> &GuestLayout {
        &self.layout
    }

    /// Generate the program for `text`. Pure; blank text is the caller's
    /// concern.
    pub fn synthesize(&self, text: &str) -> GuestProgram {
        let module = self.layout.module_name();
        let mut source = String::new();

        // Preamble
        source.push_str("import importlib.util\n");
        source.push_str("import os\n\n");
        source.push_str(&format!("os.chdir({})\n\n", py_str(&self.layout.workdir)));
        source.push_str(&format!(
            "_spec = importlib.util.spec_from_file_location({}, {})\n",
            py_str(module),
            py_str(&self.layout.module_file)
        ));
        source.push_str(&format!(
            "{MODULE_BINDING} = importlib.util.module_from_spec(_spec)\n"
        ));
        source.push_str(&format!("_spec.loader.exec_module({MODULE_BINDING})\n\n"));

        // Request text, one literal per line
        source.push_str("_text = \"\".join([\n");
        if text.is_empty() {
            source.push_str("    \"\",\n");
        }
        for line in text.split_inclusive('\n') {
            source.push_str(&format!("    {},\n", py_str(line)));
        }
        source.push_str("])\n\n");

        // Parameters
        source.push_str(&format!(
            "with {MODULE_BINDING}.{MANAGER_CLASS}(auto_save=True, output={}) as cm:\n",
            py_str(self.settings.output_stem())
        ));
        source.push_str("    cm.set_text(_text)\n");
        source.push_str(&format!(
            "    cm.set_stopwords({})\n",
            py_set(&self.settings.stopwords)
        ));
        source.push_str(&format!(
            "    cm.set_bgcolor({})\n",
            py_str(&self.settings.background_color)
        ));
        source.push_str(&format!("    cm.set_font({})\n", py_str(&self.settings.font)));
        source.push_str(&format!("    cm.set_max_words({})\n", self.settings.max_words));
        source.push_str(&format!("    {OUTPUT_VARIABLE} = cm.{BUILD_CALL}()\n"));

        GuestProgram { source }
    }
}

/// Render `value` as a double-quoted Python string literal.
///
/// Quotes, backslashes and every control character are escaped, so the
/// literal always ends at its closing quote.
fn py_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if c.is_control() || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a set literal; the empty set is `set()`.
fn py_set(values: &BTreeSet<String>) -> String {
    if values.is_empty() {
        return "set()".to_string();
    }
    let items: Vec<String> = values.iter().map(|v| py_str(v)).collect();
    format!("{{{}}}", items.join(", "))
}
