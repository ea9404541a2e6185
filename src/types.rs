//! Core types for per-operation schema derivation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field values of one item, keyed by field name in declaration order.
pub type Values = Map<String, Value>;

/// Primary identifier assigned to items by a manager.
pub type ItemId = u64;

/// Key of the self-reference added to every item representation.
pub const URI_KEY: &str = "$uri";

/// Key of the item id when a resource includes it.
pub const ID_KEY: &str = "$id";

/// Key of the resource name when a resource includes it.
pub const TYPE_KEY: &str = "$type";

/// Operation a schema view is derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Enumerate,
}

impl Operation {
    /// All operations, in the order views are derived.
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Enumerate,
    ];

    /// Parse an operation name. Matching is case-insensitive.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" => Some(Operation::Create),
            "read" => Some(Operation::Read),
            "update" => Some(Operation::Update),
            "enumerate" | "list" => Some(Operation::Enumerate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Enumerate => "enumerate",
        }
    }

    /// The io capability a field needs to take part in this operation.
    ///
    /// Writes test the matching write flag; both reads test `r`.
    pub fn capability(&self) -> Io {
        match self {
            Operation::Create => Io::CREATE,
            Operation::Update => Io::UPDATE,
            Operation::Read | Operation::Enumerate => Io::READ,
        }
    }

    /// True when the view for this operation describes client input.
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field io-permission set drawn from {create, read, update}.
///
/// Written as a string of flags: `c` (create), `r` (read), `u` (update),
/// `w` (shorthand for `cu`). The default is `cru`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Io(u8);

impl Io {
    pub const NONE: Io = Io(0);
    pub const CREATE: Io = Io(0b001);
    pub const READ: Io = Io(0b010);
    pub const UPDATE: Io = Io(0b100);
    pub const WRITE: Io = Io(0b101);
    pub const ALL: Io = Io(0b111);

    /// Parse a flag string such as `"cr"` or `"rw"`.
    ///
    /// Returns the first unknown flag character on failure.
    pub fn parse(s: &str) -> Result<Self, char> {
        s.chars().try_fold(Io::NONE, |acc, c| match c {
            'c' => Ok(acc | Io::CREATE),
            'r' => Ok(acc | Io::READ),
            'u' => Ok(acc | Io::UPDATE),
            'w' => Ok(acc | Io::WRITE),
            other => Err(other),
        })
    }

    pub fn contains(&self, other: Io) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Io {
    fn default() -> Self {
        Io::ALL
    }
}

impl std::ops::BitOr for Io {
    type Output = Io;

    fn bitor(self, rhs: Io) -> Io {
        Io(self.0 | rhs.0)
    }
}

impl fmt::Display for Io {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, c) in [(Io::CREATE, 'c'), (Io::READ, 'r'), (Io::UPDATE, 'u')] {
            if self.contains(flag) {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Io {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Io({:?})", self.to_string())
    }
}

impl TryFrom<String> for Io {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Io::parse(&value).map_err(|c| format!("unknown io flag '{}' in \"{}\"", c, value))
    }
}

impl From<Io> for String {
    fn from(io: Io) -> Self {
        io.to_string()
    }
}
