mod preview;

pub use preview::audit_preview;
