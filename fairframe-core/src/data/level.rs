//! Categorical values used as feature classes and row-index components.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One distinct value of a partitioning feature.
///
/// Levels are totally ordered so that feature classes, and therefore the
/// cross-product row index, are identical however the data was batched.
/// Booleans come first, then numbers in numeric order, then strings.
/// Integral floats are stored as `Int`, so `1` and `1.0` are one class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Level {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Level {
    /// Convert a JSON scalar into a level.
    ///
    /// Returns `None` for `null`, arrays and objects, which are not valid
    /// categorical values.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Level::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Level::Int(i)),
                None => n.as_f64().map(Level::from),
            },
            serde_json::Value::String(s) => Some(Level::Str(s.clone())),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Level::Bool(_) => 0,
            Level::Int(_) | Level::Float(_) => 1,
            Level::Str(_) => 2,
        }
    }
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Level {}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Level::Bool(a), Level::Bool(b)) => a.cmp(b),
            (Level::Int(a), Level::Int(b)) => a.cmp(b),
            (Level::Float(a), Level::Float(b)) => a.total_cmp(b),
            // Ties cannot occur for normalized levels; ints sort first if they do.
            (Level::Int(a), Level::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Level::Float(a), Level::Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (Level::Str(a), Level::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Level {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Level::Bool(b) => b.hash(state),
            Level::Int(i) => i.hash(state),
            Level::Float(f) => f.to_bits().hash(state),
            Level::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Bool(b) => write!(f, "{b}"),
            Level::Int(i) => write!(f, "{i}"),
            Level::Float(x) => write!(f, "{x}"),
            Level::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Level {
    fn from(s: &str) -> Self {
        Level::Str(s.to_string())
    }
}

impl From<String> for Level {
    fn from(s: String) -> Self {
        Level::Str(s)
    }
}

impl From<i64> for Level {
    fn from(i: i64) -> Self {
        Level::Int(i)
    }
}

impl From<i32> for Level {
    fn from(i: i32) -> Self {
        Level::Int(i64::from(i))
    }
}

impl From<bool> for Level {
    fn from(b: bool) -> Self {
        Level::Bool(b)
    }
}

impl From<f64> for Level {
    fn from(x: f64) -> Self {
        // i64::MAX as f64 rounds up to 2^63, hence the strict bound.
        if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 {
            Level::Int(x as i64)
        } else {
            Level::Float(x)
        }
    }
}
