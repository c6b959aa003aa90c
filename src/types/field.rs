use crate::common::{Error, Result};
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single stored value of a document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Field {
    Null,
    Boolean(bool),
    Integer(i32),
    Float(f32),
    String(String),
}

impl PartialEq for Field {
    fn eq(&self, other: &Field) -> bool {
        match (self, other) {
            (Field::Null, Field::Null) => true,
            (Field::Boolean(a), Field::Boolean(b)) => a == b,
            (Field::Integer(a), Field::Integer(b)) => a == b,
            // NaN equals NaN, so that floats can be grouped and sorted.
            (Field::Float(a), Field::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Field::String(a), Field::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Field::Null => {}
            Field::Boolean(b) => b.hash(state),
            Field::Integer(i) => i.hash(state),
            Field::Float(f) if f.is_nan() => 0.hash(state),
            Field::Float(f) => f.to_bits().hash(state),
            Field::String(s) => s.hash(state),
        }
    }
}

/// Total order used for sorting: NULL first, then booleans, integers, floats
/// and strings. NaN sorts after every other float.
impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Field::Boolean(a), Field::Boolean(b)) => a.cmp(b),
            (Field::Integer(a), Field::Integer(b)) => a.cmp(b),
            (Field::Float(a), Field::Float(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            (Field::String(a), Field::String(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Field::Null => f.write_str("NULL"),
            Field::Boolean(true) => f.write_str("TRUE"),
            Field::Boolean(false) => f.write_str("FALSE"),
            Field::Integer(integer) => integer.fmt(f),
            Field::Float(float) => write!(f, "{float:?}"),
            Field::String(string) => write!(f, "'{}'", string.escape_debug()),
        }
    }
}

impl From<bool> for Field {
    fn from(v: bool) -> Self {
        Field::Boolean(v)
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Integer(v)
    }
}

impl From<f32> for Field {
    fn from(v: f32) -> Self {
        Field::Float(v)
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::String(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::String(v.to_owned())
    }
}

impl Field {
    fn rank(&self) -> u8 {
        match self {
            Field::Null => 0,
            Field::Boolean(_) => 1,
            Field::Integer(_) => 2,
            Field::Float(_) => 3,
            Field::String(_) => 4,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// The field's data type, `None` for NULL which fits every type.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Field::Null => None,
            Field::Boolean(_) => Some(DataType::Boolean),
            Field::Integer(_) => Some(DataType::Integer),
            Field::Float(_) => Some(DataType::Float),
            Field::String(_) => Some(DataType::String),
        }
    }

    /// Converts the value to `data_type`, for comparisons against a column.
    pub fn cast(&self, data_type: DataType) -> Result<Field> {
        match (self, data_type) {
            (Field::Null, _) => Ok(Field::Null),
            (Field::Boolean(_), DataType::Boolean)
            | (Field::Integer(_), DataType::Integer)
            | (Field::Float(_), DataType::Float)
            | (Field::String(_), DataType::String) => Ok(self.clone()),
            (Field::Integer(i), DataType::Float) => Ok(Field::Float(*i as f32)),
            (Field::Float(f), DataType::Integer) if f.fract() == 0.0 => {
                if *f >= i32::MIN as f32 && *f <= i32::MAX as f32 {
                    Ok(Field::Integer(*f as i32))
                } else {
                    Err(Error::InvalidInput(format!("{self} is out of range for {data_type}")))
                }
            }
            (Field::String(s), DataType::Integer) => s
                .parse::<i32>()
                .map(Field::Integer)
                .map_err(|_| Error::InvalidInput(format!("can't cast {self} to {data_type}"))),
            (Field::String(s), DataType::Float) => s
                .parse::<f32>()
                .map(Field::Float)
                .map_err(|_| Error::InvalidInput(format!("can't cast {self} to {data_type}"))),
            _ => Err(Error::InvalidInput(format!("can't cast {self} to {data_type}"))),
        }
    }
}
