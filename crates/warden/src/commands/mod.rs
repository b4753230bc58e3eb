//! Command implementations
//!
//! Each command prints a human line by default and the serialized result
//! with `--json`.

pub mod budget;
pub mod doc;
pub mod lock;
pub mod participant;
pub mod stream;

use anyhow::Result;
use serde::Serialize;

use crate::context::Context;

/// Print `value` as JSON in JSON mode, otherwise the text from `human`.
pub fn emit<T, F>(ctx: &Context, value: &T, human: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce() -> String,
{
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let text = human();
        if !text.is_empty() {
            println!("{text}");
        }
    }
    Ok(())
}
