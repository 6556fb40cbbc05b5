//! Module-level passes. Each pass mutates the module in place and keeps it
//! well-formed; the pipeline verifies before and after so that a broken input
//! is reported against the frontend and a broken output against the pass.

use tracing::debug;

use crate::middle::il::{Module, verify::{VerifyError, verify_module}};

pub mod mem2reg;

pub use mem2reg::{Mem2RegStats, mem2reg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub verify: bool,
    pub mem2reg: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            verify: true,
            mem2reg: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub functions: usize,
    pub mem2reg: Mem2RegStats,
}

pub fn run_pipeline(
    module: &mut Module,
    options: &PipelineOptions,
) -> Result<PipelineReport, VerifyError> {
    let mut report = PipelineReport {
        functions: module.functions.len(),
        ..PipelineReport::default()
    };

    if options.verify {
        verify_module(module)?;
    }

    if options.mem2reg {
        mem2reg(module, Some(&mut report.mem2reg));
        if options.verify {
            verify_module(module)?;
        }
    }

    debug!(functions = report.functions, stats = %report.mem2reg, "pipeline finished");
    Ok(report)
}
