//! Translation catalogs for command descriptions and status messages.
//!
//! Catalogs use the Qt Linguist `.ts` format so the translator files that ship
//! with Novelist can be loaded unchanged. A small German catalog is embedded
//! for the strings the editing core produces itself.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONTEXT_PROJECT_MODEL: &str = "novelist::ProjectModel";
pub const CONTEXT_EDIT_LOG: &str = "novelist::EditLog";
pub const CONTEXT_FIND_WIDGET: &str = "novelist::FindWidget";
pub const CONTEXT_STATS_DIALOG: &str = "novelist::StatsDialog";

const BUILTIN_GERMAN: &[(&str, &str, &str)] = &[
    (CONTEXT_PROJECT_MODEL, "<unnamed>", "<unbenannt>"),
    (CONTEXT_PROJECT_MODEL, "Notebook", "Notizbuch"),
    (CONTEXT_PROJECT_MODEL, "inserting \"%1\"", "\"%1\" einfügen"),
    (CONTEXT_PROJECT_MODEL, "removing \"%1\"", "\"%1\" entfernen"),
    (CONTEXT_PROJECT_MODEL, "moving \"%1\"", "\"%1\" bewegen"),
    (
        CONTEXT_PROJECT_MODEL,
        "changing name from \"%1\" to \"%2\"",
        "Änderung des Namens von \"%1\" nach \"%2\"",
    ),
    (
        CONTEXT_PROJECT_MODEL,
        "changing project properties",
        "Änderung der Projekteigenschaften",
    ),
    (CONTEXT_EDIT_LOG, "Undo %1", "Rückgängig: %1"),
    (CONTEXT_EDIT_LOG, "Redo %1", "Wiederherstellen: %1"),
    (CONTEXT_FIND_WIDGET, "Title", "Titel"),
    (CONTEXT_FIND_WIDGET, "Content", "Inhalt"),
    (
        CONTEXT_FIND_WIDGET,
        "Looking for matches...",
        "Suche nach Übereinstimmungen...",
    ),
    (
        CONTEXT_FIND_WIDGET,
        "(%1 of %2 matches)",
        "(%1 von %2 Übereinstimmungen)",
    ),
    (
        CONTEXT_FIND_WIDGET,
        "Unable to replace the selected occurrence.",
        "Das ausgewählte Ergebnis kann nicht ersetzt werden.",
    ),
    (
        CONTEXT_FIND_WIDGET,
        "The project might have changed since this result was found.",
        "Möglicherweise hat sich das Projekt verändert seit das Ergebnis gefunden wurde.",
    ),
    (
        CONTEXT_FIND_WIDGET,
        "%1 occurrences could not be replaced.",
        "%1 Ergebnisse konnten nicht ersetzt werden.",
    ),
    (
        CONTEXT_FIND_WIDGET,
        "The project might have changed since the results were found.",
        "Möglicherweise hat sich das Projekt verändert seit die Ergebnisse gefunden wurden.",
    ),
    (CONTEXT_STATS_DIALOG, "Words", "Worte"),
    (CONTEXT_STATS_DIALOG, "Letters", "Buchstaben"),
];

#[derive(Debug, Error)]
pub enum LocalizationError {
    #[error("failed to read catalog {0}: {1}")]
    ReadFile(PathBuf, io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] quick_xml::DeError),
}

/// Messages of one `.ts` file, grouped by context.
#[derive(Debug, Clone, Default)]
pub struct TsCatalog {
    language: Option<String>,
    contexts: HashMap<String, HashMap<String, String>>,
}

impl TsCatalog {
    pub fn new(language: Option<String>) -> Self {
        Self {
            language,
            contexts: HashMap::new(),
        }
    }

    /// Parses the XML of a Qt Linguist translation source file.
    pub fn from_ts_str(xml: &str) -> Result<Self, LocalizationError> {
        let file: TsFile = quick_xml::de::from_str(xml)?;
        let mut catalog = Self::new(file.language);
        for context in file.contexts {
            for message in context.messages {
                let Some(translation) = message.translation else {
                    continue;
                };
                if !translation.is_usable() {
                    continue;
                }
                catalog.insert(&context.name, message.source, translation.text);
            }
        }
        Ok(catalog)
    }

    /// Embedded catalog for `locale` (`de`, `de-DE`, `de_AT`, ...), if one ships.
    pub fn builtin(locale: &str) -> Option<Self> {
        let language = locale
            .split(|c: char| c == '-' || c == '_')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match language.as_str() {
            "de" => {
                let mut catalog = TsCatalog::new(Some("de_DE".into()));
                for (context, source, translation) in BUILTIN_GERMAN {
                    catalog.insert(context, *source, *translation);
                }
                Some(catalog)
            }
            _ => None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LocalizationError> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .map_err(|err| LocalizationError::ReadFile(path.to_path_buf(), err))?;
        let catalog = Self::from_ts_str(&xml)?;
        log::debug!(
            "loaded {} translations from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn insert(
        &mut self,
        context: &str,
        source: impl Into<String>,
        translation: impl Into<String>,
    ) {
        self.contexts
            .entry(context.to_string())
            .or_default()
            .insert(source.into(), translation.into());
    }

    pub fn lookup(&self, context: &str, source: &str) -> Option<&str> {
        self.contexts
            .get(context)
            .and_then(|messages| messages.get(source))
            .map(String::as_str)
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn len(&self) -> usize {
        self.contexts.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves source strings through an ordered list of catalogs.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    catalogs: Vec<TsCatalog>,
}

impl Translator {
    /// Translator that returns every source string unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Translator backed by the embedded catalog for `locale`, if there is one.
    pub fn builtin(locale: &str) -> Self {
        match TsCatalog::builtin(locale) {
            Some(catalog) => Self::identity().with_catalog(catalog),
            None => Self::identity(),
        }
    }

    /// Adds a catalog consulted after the existing ones.
    pub fn with_catalog(mut self, catalog: TsCatalog) -> Self {
        self.catalogs.push(catalog);
        self
    }

    pub fn tr<'a>(&'a self, context: &str, source: &'a str) -> &'a str {
        self.catalogs
            .iter()
            .find_map(|catalog| catalog.lookup(context, source))
            .unwrap_or(source)
    }

    /// Translates and substitutes `%1`.. placeholders.
    pub fn tr_args(&self, context: &str, source: &str, args: &[&str]) -> String {
        fill(self.tr(context, source), args).into_owned()
    }
}

/// Replaces Qt-style `%1`..`%9` markers with positional arguments.
///
/// Markers without a matching argument are left as they are.
pub fn fill<'a>(template: &'a str, args: &[&str]) -> Cow<'a, str> {
    if !template.contains('%') {
        return Cow::Borrowed(template);
    }
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let slot = chars
            .peek()
            .and_then(|next| next.to_digit(10))
            .filter(|digit| *digit > 0)
            .and_then(|digit| args.get(digit as usize - 1));
        match slot {
            Some(arg) => {
                chars.next();
                out.push_str(arg);
            }
            None => out.push(ch),
        }
    }
    Cow::Owned(out)
}

#[derive(Debug, Deserialize)]
#[serde(rename = "TS")]
struct TsFile {
    #[serde(rename = "@language", default)]
    language: Option<String>,
    #[serde(rename = "context", default)]
    contexts: Vec<TsContext>,
}

#[derive(Debug, Deserialize)]
struct TsContext {
    #[serde(default)]
    name: String,
    #[serde(rename = "message", default)]
    messages: Vec<TsMessage>,
}

#[derive(Debug, Deserialize)]
struct TsMessage {
    #[serde(default)]
    source: String,
    #[serde(default)]
    translation: Option<TsTranslation>,
}

#[derive(Debug, Deserialize)]
struct TsTranslation {
    #[serde(rename = "@type", default)]
    kind: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

impl TsTranslation {
    fn is_usable(&self) -> bool {
        let dropped = matches!(
            self.kind.as_deref(),
            Some("vanished") | Some("obsolete") | Some("unfinished")
        );
        !dropped && !self.text.is_empty()
    }
}
