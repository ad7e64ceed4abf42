//! Workflow command annotations emitted on stdout.
//!
//! These `::command::` lines are the structured output channel of the tool;
//! everything else written to stdout is plain progress text.

pub fn debug(message: &str) {
    println!("::debug::{message}");
}

pub fn error(message: &str) {
    println!("::error::{message}");
}

/// Ask the CI runner to mask a secret in all further log output.
pub fn add_mask(value: &str) {
    println!("::add-mask::{value}");
}

pub fn set_output(name: &str, value: &str) {
    println!("::set-output name={name}::{value}");
}

pub fn set_env(name: &str, value: &str) {
    println!("::set-env name={name}::{value}");
}
