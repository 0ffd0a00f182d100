use std::collections::BTreeMap;
use std::fmt;

use tracing::{Level, Span};

/// Component, operation and free-form fields attached to a span
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub component: String,
    pub operation: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: impl Into<String>) -> Self {
        LogContext {
            component: component.into(),
            ..Default::default()
        }
    }

    pub fn with_operation(component: impl Into<String>, operation: impl Into<String>) -> Self {
        LogContext {
            operation: Some(operation.into()),
            ..Self::new(component)
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Span carrying this context.
    ///
    /// Span field names are static, so the extra fields travel as one `ctx` string.
    pub fn span(&self, level: Level) -> Span {
        let operation = self.operation.as_deref().unwrap_or("-");
        let ctx = self.to_string();
        macro_rules! context_span {
            ($span:ident) => {
                tracing::$span!("siphon", component = %self.component, operation, ctx = %ctx)
            };
        }
        match level {
            Level::TRACE => context_span!(trace_span),
            Level::DEBUG => context_span!(debug_span),
            Level::INFO => context_span!(info_span),
            Level::WARN => context_span!(warn_span),
            Level::ERROR => context_span!(error_span),
        }
    }

    /// Run `f` inside this context's span
    pub fn in_scope<F, R>(&self, level: Level, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.span(level).in_scope(f)
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.component)?;
        if let Some(operation) = &self.operation {
            write!(f, "/{}", operation)?;
        }
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_orders_fields() {
        let ctx = LogContext::with_operation("transaction", "timer")
            .with_field("timer", "A")
            .with_field("branch", "z9hG4bK1");
        assert_eq!(ctx.to_string(), "transaction/timer branch=z9hG4bK1 timer=A");
        assert_eq!(LogContext::new("session").to_string(), "session");
    }

    #[test]
    fn test_in_scope_returns_value() {
        let ctx = LogContext::new("session");
        assert_eq!(ctx.in_scope(Level::DEBUG, || 42), 42);
    }
}
