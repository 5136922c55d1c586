//! Interpreter behavior tests
//!
//! Organized by feature area

mod helpers;

mod basic_tests;
mod control_tests;
mod error_tests;
mod flow_tests;
mod function_tests;
