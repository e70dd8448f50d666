//! Method records and handler types

use oscwire_core::{AddressPattern, Bundle, Message, TimeTag};
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Message handler. Errors are reported through the dispatcher's error
/// callback and never stop dispatch.
pub type Handler = Arc<dyn Fn(&Message, &HandlerContext) -> anyhow::Result<()> + Send + Sync>;

/// Called before and after the children of a due bundle are dispatched
pub type BundleHook = Arc<dyn Fn(&Bundle) + Send + Sync>;

/// Opaque per-method data handed back to the handler
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Registration handle, unique per dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub(crate) u64);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

/// What a handler knows about the message it is handling
#[derive(Clone, Default)]
pub struct HandlerContext {
    /// Sender address, when the message came from a transport
    pub source: Option<SocketAddr>,
    /// Time tag of the innermost enclosing bundle
    pub timetag: Option<TimeTag>,
    /// The matched method; `None` for the fallback handler
    pub method: Option<MethodId>,
    pub(crate) user_data: Option<UserData>,
}

impl HandlerContext {
    /// Borrow the method's user data as `T`
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("source", &self.source)
            .field("timetag", &self.timetag)
            .field("method", &self.method)
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}

/// A pattern, optional type signature and handler
pub struct Method {
    pattern: AddressPattern,
    typespec: Option<String>,
    pub(crate) handler: Handler,
    pub(crate) user_data: Option<UserData>,
}

impl Method {
    /// Compile `pattern` and bind it to `handler`
    pub fn new<F>(pattern: &str, handler: F) -> oscwire_core::Result<Self>
    where
        F: Fn(&Message, &HandlerContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Ok(Self {
            pattern: AddressPattern::compile(pattern)?,
            typespec: None,
            handler: Arc::new(handler),
            user_data: None,
        })
    }

    /// Only accept messages whose type tags equal `typespec` exactly.
    /// The leading `,` is optional.
    pub fn with_typespec(mut self, typespec: &str) -> Self {
        let mut normalized = String::with_capacity(typespec.len() + 1);
        if !typespec.starts_with(',') {
            normalized.push(',');
        }
        normalized.push_str(typespec);
        self.typespec = Some(normalized);
        self
    }

    pub fn with_user_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.user_data = Some(Arc::new(data));
        self
    }

    pub fn pattern(&self) -> &AddressPattern {
        &self.pattern
    }

    /// Type signature including the leading `,`, if one was declared
    pub fn typespec(&self) -> Option<&str> {
        self.typespec.as_deref()
    }

    /// Whether this method should receive `msg`
    pub fn accepts(&self, msg: &Message) -> bool {
        if let Some(spec) = &self.typespec {
            if *spec != msg.type_tags() {
                return false;
            }
        }
        self.pattern.matches(msg.path())
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("pattern", &self.pattern.as_str())
            .field("typespec", &self.typespec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Message, _: &HandlerContext) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_accepts_pattern_and_typespec() {
        let method = Method::new("/synth/*/freq", noop).unwrap().with_typespec("f");
        assert_eq!(method.typespec(), Some(",f"));

        let ok = Message::new("/synth/1/freq").unwrap().arg(440.0f32);
        let wrong_type = Message::new("/synth/1/freq").unwrap().arg(440);
        let wrong_path = Message::new("/synth/1/gain").unwrap().arg(1.0f32);
        assert!(method.accepts(&ok));
        assert!(!method.accepts(&wrong_type));
        assert!(!method.accepts(&wrong_path));
    }

    #[test]
    fn test_empty_typespec_means_no_arguments() {
        let method = Method::new("/ping", noop).unwrap().with_typespec(",");
        assert!(method.accepts(&Message::new("/ping").unwrap()));
        assert!(!method.accepts(&Message::new("/ping").unwrap().arg(1)));
    }

    #[test]
    fn test_bad_pattern() {
        assert!(Method::new("/a/{b", noop).is_err());
    }

    #[test]
    fn test_user_data_downcast() {
        let ctx = HandlerContext {
            user_data: Some(Arc::new(7u32)),
            ..HandlerContext::default()
        };
        assert_eq!(ctx.user_data::<u32>(), Some(&7));
        assert_eq!(ctx.user_data::<String>(), None);
    }
}
