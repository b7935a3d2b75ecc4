//! Entity kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// The type of an entity. Names are unique per kind and library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Object,
    Scene,
    NodeTree,
    Action,
    Material,
}

impl IdKind {
    /// Every kind, in listing order.
    pub const ALL: [IdKind; 5] = [
        IdKind::Scene,
        IdKind::Object,
        IdKind::NodeTree,
        IdKind::Action,
        IdKind::Material,
    ];

    /// Two-letter code used in diagnostics.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Object => "OB",
            Self::Scene => "SC",
            Self::NodeTree => "NT",
            Self::Action => "AC",
            Self::Material => "MA",
        }
    }

    /// Name of the schema struct describing entities of this kind.
    pub const fn struct_name(self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Scene => "Scene",
            Self::NodeTree => "NodeTree",
            Self::Action => "Action",
            Self::Material => "Material",
        }
    }

    /// Looks a kind up by its schema struct name.
    pub fn from_struct_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.struct_name() == name)
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.struct_name())
    }
}

impl FromStr for IdKind {
    type Err = Error;

    /// Accepts the struct name (`"Object"`), the snake-case form (`"node_tree"`)
    /// or the two-letter code (`"OB"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IdKind::ALL
            .into_iter()
            .find(|k| {
                k.struct_name().eq_ignore_ascii_case(s)
                    || k.code().eq_ignore_ascii_case(s)
                    || k.struct_name().eq_ignore_ascii_case(&s.replace('_', ""))
            })
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}
