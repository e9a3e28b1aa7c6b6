//! Leveled, structured logger collaborator.
//!
//! The pipeline never reaches for a global logger. Whatever needs to log is
//! handed an `Arc<dyn Logger>` when it is built; [`TracingLogger`] forwards to
//! `tracing` and is what [`ServerBuilder`](crate::ServerBuilder) uses unless
//! told otherwise. [`NopLogger`] drops everything.

use std::fmt;

pub use tracing::Level;

/// One structured key-value pair.
pub type Field<'a> = (&'a str, &'a dyn fmt::Display);

/// Accepts leveled messages with optional key-value pairs.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str, fields: &[Field<'_>]);

    fn error(&self, message: &str, fields: &[Field<'_>]) {
        self.log(Level::ERROR, message, fields);
    }

    fn warn(&self, message: &str, fields: &[Field<'_>]) {
        self.log(Level::WARN, message, fields);
    }

    fn info(&self, message: &str, fields: &[Field<'_>]) {
        self.log(Level::INFO, message, fields);
    }

    fn debug(&self, message: &str, fields: &[Field<'_>]) {
        self.log(Level::DEBUG, message, fields);
    }
}

/// Forwards to the `tracing` subscriber installed by the application.
///
/// Field names are only known at runtime, so they are rendered into a single
/// `fields` value as `key=value` pairs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, fields: &[Field<'_>]) {
        let fields = KeyVals(fields);
        if level == Level::ERROR {
            tracing::error!(fields = %fields, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(fields = %fields, "{message}");
        } else if level == Level::INFO {
            tracing::info!(fields = %fields, "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(fields = %fields, "{message}");
        } else {
            tracing::trace!(fields = %fields, "{message}");
        }
    }
}

/// Discards every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn log(&self, _level: Level, _message: &str, _fields: &[Field<'_>]) {}
}

struct KeyVals<'a>(&'a [Field<'a>]);

impl fmt::Display for KeyVals<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_vals_render_in_order() {
        let status = 500;
        let fields: [Field<'_>; 2] = [("stage", &"decode"), ("status", &status)];
        assert_eq!(KeyVals(&fields).to_string(), "stage=decode status=500");
    }

    #[test]
    fn empty_fields_render_empty() {
        assert_eq!(KeyVals(&[]).to_string(), "");
    }
}
