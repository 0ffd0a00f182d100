use std::fmt;

use crate::errors::types::{Error, Result};

/// Where an error happened: component, operation and optional details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Attach an [`ErrorContext`] to a failing result
pub trait ErrorExt<T> {
    fn context(self, ctx: ErrorContext) -> Result<T>;

    /// Like [`ErrorExt::context`], building the context only on failure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> ErrorContext;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, ctx: ErrorContext) -> Result<T> {
        self.map_err(|e| Error::WithContext {
            context: ctx.to_string(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> ErrorContext,
    {
        self.map_err(|e| Error::WithContext {
            context: f().to_string(),
            source: Box::new(e.into()),
        })
    }
}
