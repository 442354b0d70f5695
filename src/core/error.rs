use std::error::Error as StdError;
use std::fmt;

use crate::core::value::ElementId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    ArgumentShape,
    TypeMismatch,
    StackImbalance,
    Engine,
    Protocol,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    operation: Option<String>,
    leaked: Option<i64>,
    created: Option<Vec<ElementId>>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            operation: None,
            leaked: None,
            created: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// Net operand count left behind by an operation (negative when it consumed too many).
    pub fn leaked(&self) -> Option<i64> {
        self.leaked
    }

    /// Elements that already exist when a multi-step operation failed part way.
    pub fn created(&self) -> Option<&[ElementId]> {
        self.created.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_leaked(mut self, leaked: i64) -> Self {
        self.leaked = Some(leaked);
        self
    }

    pub fn with_created(mut self, created: Vec<ElementId>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(operation) = &self.operation {
            write!(f, " (operation: {operation})")?;
        }
        if let Some(leaked) = self.leaked {
            write!(f, " (leaked: {leaked})")?;
        }
        if let Some(created) = &self.created {
            write!(f, " (created: {created:?})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::ArgumentShape => 3,
        ErrorKind::TypeMismatch => 4,
        ErrorKind::StackImbalance => 5,
        ErrorKind::Engine => 6,
        ErrorKind::Protocol => 7,
        ErrorKind::Io => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::ArgumentShape, 3),
            (ErrorKind::TypeMismatch, 4),
            (ErrorKind::StackImbalance, 5),
            (ErrorKind::Engine, 6),
            (ErrorKind::Protocol, 7),
            (ErrorKind::Io, 8),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::StackImbalance)
            .with_message("stack depth changed")
            .with_operation("GetStatus")
            .with_leaked(2);
        let text = err.to_string();
        assert!(text.starts_with("StackImbalance: stack depth changed"));
        assert!(text.contains("(operation: GetStatus)"));
        assert!(text.contains("(leaked: 2)"));
    }

    #[test]
    fn created_ids_survive_on_error() {
        let err = Error::new(ErrorKind::Engine).with_created(vec![4, 5, 6]);
        assert_eq!(err.created(), Some(&[4u64, 5, 6][..]));
    }
}
