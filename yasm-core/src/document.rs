//! Declaration documents.
//!
//! A declaration is read into a plain [`MachineDocument`] tree before any
//! semantic checks run; the loader validates the tree afterwards. JSON and
//! YAML are supported:
//!
//! ```yaml
//! states:
//!   - id: created
//!     initial: true
//!     exit: [audit]
//!     transitions:
//!       - event: pay
//!         target: paid
//!         condition: has_funds
//!         actions: [charge]
//!   - id: paid
//!     final: true
//! ```
//!
//! Action lists take either bare ids or `{exec: id}` objects.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Root of a declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineDocument {
    #[serde(default)]
    pub states: Vec<StateDecl>,
}

/// A declared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateDecl {
    pub id: String,

    #[serde(default, rename = "initial")]
    pub is_initial: bool,

    #[serde(default, rename = "final")]
    pub is_final: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<ActionDecl>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit: Vec<ActionDecl>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionDecl>,
}

/// A declared transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionDecl {
    pub event: String,

    /// Target state id; absent for internal transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Guard condition id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionDecl>,
}

/// Reference to a registered action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDecl {
    pub exec: String,
}

impl ActionDecl {
    pub fn new(exec: impl Into<String>) -> Self {
        Self { exec: exec.into() }
    }
}

impl<'de> Deserialize<'de> for ActionDecl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, MapAccess, Visitor};

        struct ActionVisitor;

        impl<'de> Visitor<'de> for ActionVisitor {
            type Value = ActionDecl;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an action id or an object with an `exec` id")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ActionDecl::new(v))
            }

            // YAML reads bare ids such as `2` or `yes` as scalars.
            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ActionDecl::new(v.to_string()))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ActionDecl::new(v.to_string()))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ActionDecl::new(v.to_string()))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ActionDecl::new(v.to_string()))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut exec: Option<String> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "exec" => {
                            if exec.is_some() {
                                return Err(de::Error::duplicate_field("exec"));
                            }
                            exec = Some(map.next_value()?);
                        }
                        other => return Err(de::Error::unknown_field(other, &["exec"])),
                    }
                }
                exec.map(ActionDecl::new)
                    .ok_or_else(|| de::Error::missing_field("exec"))
            }
        }

        deserializer.deserialize_any(ActionVisitor)
    }
}

impl MachineDocument {
    /// Every action id referenced, in first-use order.
    pub fn action_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.states
            .iter()
            .flat_map(|s| {
                s.entry
                    .iter()
                    .chain(&s.exit)
                    .chain(s.transitions.iter().flat_map(|t| &t.actions))
            })
            .map(|a| a.exec.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Every condition id referenced, in first-use order.
    pub fn condition_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.states
            .iter()
            .flat_map(|s| &s.transitions)
            .filter_map(|t| t.condition.as_deref())
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Concrete serialization of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Picks a format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(DocumentFormat::Json),
            Some("yaml") | Some("yml") => Ok(DocumentFormat::Yaml),
            _ => Err(ParseError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn parse(self, text: &str) -> Result<MachineDocument, ParseError> {
        let document = match self {
            DocumentFormat::Json => serde_json::from_str(text)?,
            DocumentFormat::Yaml => serde_yaml::from_str(text)?,
        };
        Ok(document)
    }
}

/// Where a declaration is read from.
#[derive(Debug, Clone)]
pub enum Source {
    /// A file; the format follows its extension.
    Path(PathBuf),
    /// Text already in memory.
    Inline { text: String, format: DocumentFormat },
}

impl Source {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    pub fn inline(text: impl Into<String>, format: DocumentFormat) -> Self {
        Source::Inline {
            text: text.into(),
            format,
        }
    }

    /// Reads and parses the declaration.
    pub fn read(&self) -> Result<MachineDocument, ParseError> {
        match self {
            Source::Path(path) => {
                let format = DocumentFormat::from_path(path)?;
                let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
                    path: path.clone(),
                    source,
                })?;
                format.parse(&text)
            }
            Source::Inline { text, format } => format.parse(text),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Inline { format, .. } => write!(f, "<inline {:?}>", format),
        }
    }
}
