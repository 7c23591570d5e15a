use std::sync::Arc;

use anyhow::Result;

use diagkit_core::config::{DebugBackendKind, DebugConfig, SubsystemConfig};
use diagkit_core::debug::{DebugBackend, DebugFacade};
use diagkit_core::listener::TracingSubsystem;

use crate::backend::TracingDebugBackend;
use crate::subsystem::{InProcessSubsystem, IpcTracingSubsystem};

pub fn build_debug_facade(cfg: &DebugConfig) -> Arc<DebugFacade> {
    let builder = DebugFacade::builder().indent_size(cfg.indent_size);
    match cfg.backend {
        DebugBackendKind::Minimal => builder.build(),
        DebugBackendKind::Tracing => builder
            .plugin(|| Ok(Arc::new(TracingDebugBackend::new()) as Arc<dyn DebugBackend>))
            .build(),
    }
}

pub fn build_subsystem(cfg: &SubsystemConfig) -> Result<Arc<dyn TracingSubsystem>> {
    match cfg {
        SubsystemConfig::Ipc(ipc_cfg) => Ok(Arc::new(IpcTracingSubsystem::new(ipc_cfg)?)),
        SubsystemConfig::InProcess => Ok(Arc::new(InProcessSubsystem::new())),
    }
}
