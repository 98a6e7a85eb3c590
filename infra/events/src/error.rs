use std::borrow::Cow;

/// Errors that can occur during bus, subscriber and relay operations.
///
/// Every failure in the dispatch core is a misuse of the attach/detach protocol;
/// there is no I/O or decoding path. Removing an already-removed connection is
/// not an error and never produces one of these.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The attach/detach protocol between a bus and a subscriber or relay was broken,
    /// e.g. attaching something that is already attached elsewhere.
    #[error("Protocol violation{}: {message}", format_context(.context))]
    ProtocolViolation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal logic errors.
    #[error("Internal bus error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl BusError {
    pub(crate) fn protocol(message: impl Into<Cow<'static, str>>) -> Self {
        Self::ProtocolViolation { message: message.into(), context: None }
    }

    /// Returns `true` for attach/detach protocol violations.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }
}

/// Convenience alias used across the crate.
pub type Result<T, E = BusError> = std::result::Result<T, E>;

/// Adds `.context(...)` to results carrying a [`BusError`].
pub trait BusErrorExt<T> {
    /// Attaches a human-readable context to the error, if any.
    ///
    /// # Errors
    /// Returns the original error with the context set.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T>;
}

impl<T> BusErrorExt<T> for Result<T> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                BusError::ProtocolViolation { context: c, .. }
                | BusError::Internal { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl From<&'static str> for BusError {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self::Internal { message: Cow::Borrowed(s), context: None }
    }
}

impl From<String> for BusError {
    #[inline]
    fn from(s: String) -> Self {
        Self::Internal { message: Cow::Owned(s), context: None }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
