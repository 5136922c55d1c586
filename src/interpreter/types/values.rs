//! Runtime value types
//!
//! `Value` is the closed set of things an expression can produce. Geometry
//! payloads are plain fixed-size arrays; the engine does arithmetic over them
//! but never models molecular geometry.

use crate::interpreter::selection::SelectionSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/* ===================== Geometry Payloads ===================== */

/// A point or vector in 3D space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Point3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn distance(&self, other: &Point3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Component by 0-based index
    pub fn component(&self, idx: usize) -> Option<f64> {
        match idx {
            0 => Some(self.x),
            1 => Some(self.y),
            2 => Some(self.z),
            _ => None,
        }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(a: [f64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

/// Plane `ax + by + cz + d = 0` as `[a, b, c, d]`
pub type Plane = [f64; 4];
pub type Matrix3 = [[f64; 3]; 3];
pub type Matrix4 = [[f64; 4]; 4];

/* ===================== Value ===================== */

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Point(Point3),
    Plane(Plane),
    Matrix3(Matrix3),
    Matrix4(Matrix4),
    Set(SelectionSet),
    List(Vec<Value>),
    /// Reference to a user-defined function by name
    Function(String),
}

impl Value {
    /// The empty string, which stands in for "no value"
    pub fn empty() -> Self {
        Value::Str(String::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "decimal",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Point(_) => "point",
            Value::Plane(_) => "point4",
            Value::Matrix3(_) => "matrix3f",
            Value::Matrix4(_) => "matrix4f",
            Value::Set(_) => "bitset",
            Value::List(_) => "array",
            Value::Function(_) => "function",
        }
    }

    /// Truthiness used by conditions and logical operators
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            Value::Bool(b) => *b,
            Value::Set(set) => !set.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Point(_)
            | Value::Plane(_)
            | Value::Matrix3(_)
            | Value::Matrix4(_)
            | Value::Function(_) => true,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Bool(_))
    }

    /// Numeric view; booleans count as 0/1 and numeric strings are parsed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Integer view; decimals truncate toward zero
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Bool(b) => Some(*b as i64),
            Value::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            }
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SelectionSet> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Element count for sizable values
    pub fn size(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Set(set) => Some(set.count()),
            Value::Point(_) => Some(3),
            Value::Plane(_) => Some(4),
            Value::Matrix3(_) => Some(3),
            Value::Matrix4(_) => Some(4),
            _ => None,
        }
    }
}

/// Decimals keep one fractional digit when integral: `2.0`, `3.5`
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Point(p) => write!(
                f,
                "{{{} {} {}}}",
                format_float(p.x),
                format_float(p.y),
                format_float(p.z)
            ),
            Value::Plane(p) => {
                let parts: Vec<String> = p.iter().map(|v| format_float(*v)).collect();
                write!(f, "{{{}}}", parts.join(" "))
            }
            Value::Matrix3(m) => write!(f, "{}", format_rows(m.iter().map(|r| r.as_slice()))),
            Value::Matrix4(m) => write!(f, "{}", format_rows(m.iter().map(|r| r.as_slice()))),
            Value::Set(set) => write!(f, "{}", set),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Function(name) => write!(f, "function {}", name),
        }
    }
}

fn format_rows<'a>(rows: impl Iterator<Item = &'a [f64]>) -> String {
    let rows: Vec<String> = rows
        .map(|r| {
            let cells: Vec<String> = r.iter().map(|v| format_float(*v)).collect();
            format!("[{}]", cells.join(" "))
        })
        .collect();
    format!("[{}]", rows.join(" "))
}

/* ===================== Conversions ===================== */

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Point3> for Value {
    fn from(v: Point3) -> Self {
        Value::Point(v)
    }
}

impl From<SelectionSet> for Value {
    fn from(v: SelectionSet) -> Self {
        Value::Set(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::selection::SetFlavor;

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::empty().is_truthy());
        assert!(!Value::from("false").is_truthy());
        assert!(Value::from("no").is_truthy());
        assert!(!Value::Set(SelectionSet::empty(SetFlavor::Particle, 3)).is_truthy());
        assert!(Value::Set(SelectionSet::all(SetFlavor::Particle, 3)).is_truthy());
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::from(" 2.5 ").as_f64(), Some(2.5));
        assert_eq!(Value::Float(-3.7).as_int(), Some(-3));
        assert_eq!(Value::from("7").as_int(), Some(7));
        assert_eq!(Value::List(vec![]).as_f64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(14).to_string(), "14");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(3.25).to_string(), "3.25");
        assert_eq!(Value::Point(Point3::new(1.0, 2.5, 0.0)).to_string(), "{1.0 2.5 0.0}");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("a")]).to_string(),
            "[1, a]"
        );
    }

    #[test]
    fn test_point_math() {
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(4.0, 4.0, 0.0);
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(a.dot(&b), 4.0);
        assert_eq!(b.component(1), Some(4.0));
        assert_eq!(b.component(3), None);
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_string(&Value::Int(4)).unwrap();
        assert_eq!(json, r#"{"t":"Int","v":4}"#);
        let back: Value = serde_json::from_str(r#"{"t":"Str","v":"hi"}"#).unwrap();
        assert_eq!(back, Value::from("hi"));
    }
}
