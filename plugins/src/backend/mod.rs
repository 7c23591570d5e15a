mod tracing;

pub use self::tracing::TracingDebugBackend;
