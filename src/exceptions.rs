//! Exception resolution: the Rust substitute for the original's dynamic
//! class-by-name lookup used to reconstruct a remote exception on the client
//! (see the protocol spec's design notes, §9 and external interfaces, §6).

use crate::error::RemoteException;

/// Turns a wire-carried `(class, message)` pair back into a typed error.
/// Hosts that want specific remote exception types reconstructed implement
/// this keyed by the qualified class name; an implementation that doesn't
/// recognize the tag should fall back to [`RemoteException`] rather than
/// panicking.
pub trait ExceptionResolver: Send + Sync {
    fn resolve(&self, class: &str, message: &str) -> Box<dyn std::error::Error + Send + Sync>;
}

/// Always resolves to [`RemoteException`], preserving the original class
/// name and message without attempting reconstruction.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExceptionResolver;

impl ExceptionResolver for DefaultExceptionResolver {
    fn resolve(&self, class: &str, message: &str) -> Box<dyn std::error::Error + Send + Sync> {
        Box::new(RemoteException::new(class, message))
    }
}
