//! Type definitions for the interpreter
//!
//! - Compiled input (Token, Statement, CompiledScript)
//! - Runtime values (Value and geometry payloads)
//! - Control signals returned by statement steps

pub mod control;
pub mod token;
pub mod values;

pub use control::ControlSignal;
pub use token::{
    CompiledScript, Keyword, Op, PropertyModifiers, Statement, Structural, Token, TokenKind,
    TokenValue,
};
pub use values::{format_float, Matrix3, Matrix4, Plane, Point3, Value};
