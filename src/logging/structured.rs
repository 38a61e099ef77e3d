//! Structured logging utilities.
//!
//! Every line has the shape `[component k=v ...] EVENT k=v ...`. The
//! bracketed prefix is a `LogContext` naming the emitting component and
//! the identifiers needed to correlate the line (client, report, path).

use std::fmt;

/// Component name plus correlation fields printed before each event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogContext {
    component: &'static str,
    fields: Vec<(&'static str, String)>,
}

impl LogContext {
    pub fn component(component: &'static str) -> Self {
        Self {
            component,
            fields: Vec::new(),
        }
    }

    /// Context for client protocol events.
    pub fn client(client_id: &str) -> Self {
        Self::component("client").with("client", client_id)
    }

    /// Add a correlation field. A later value for the same key replaces
    /// the earlier one.
    pub fn with(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    pub fn with_report(&self, report_id: &str) -> Self {
        self.clone().with("report", report_id)
    }

    pub fn name(&self) -> &'static str {
        self.component
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.component)?;
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        write!(f, "]")
    }
}

/// Log a `EVENT key=value` line at the given level, prefixed with a context.
///
/// ```ignore
/// log_event!(info, ctx, "REPORT_SUBMITTED", processing_id = resp.processing_id);
/// ```
#[macro_export]
macro_rules! log_event {
    ($level:ident, $ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::$level!(
            concat!("{} {}" $(, " ", stringify!($key), "={}")*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}
