//! Lifecycle runner

use crate::artifact::Artifact;
use crate::context::BuildContext;
use crate::error::BuildError;
use crate::state::BuildState;
use crate::step::Step;
use crate::steps::{
    AddressResolver, DiskImportWaiter, PowerController, ProvisionStep, ResourceProvisioner,
    ShutdownCoordinator, ShutdownReport, SimpleShutdownStep,
};
use thiserror::Error;

/// Successful build
#[derive(Debug)]
pub struct BuildOutcome {
    pub artifact: Artifact,
    pub shutdown: Option<ShutdownReport>,
    pub warnings: Vec<String>,
}

/// Failed build: the first fatal error plus warnings raised along the way
#[derive(Error, Debug)]
#[error("step '{step}' failed: {error}")]
pub struct BuildFailure {
    pub step: &'static str,
    #[source]
    pub error: BuildError,
    pub warnings: Vec<String>,
}

/// Runs steps in order and stops at the first error
///
/// On failure every step that started gets its `rollback` called, newest
/// first. Only resource creation defines one (VM deletion).
pub struct LifecycleRunner {
    steps: Vec<Box<dyn Step>>,
}

impl LifecycleRunner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    /// The standard pipeline for a context
    ///
    /// Without an executor there is no guest session, so provisioning is
    /// skipped and shutdown goes straight through the API.
    pub fn standard(ctx: &BuildContext) -> Self {
        let mut steps: Vec<Box<dyn Step>> = vec![
            Box::new(ResourceProvisioner),
            Box::new(DiskImportWaiter),
            Box::new(PowerController),
            Box::new(AddressResolver),
        ];
        if ctx.executor.is_some() {
            steps.push(Box::new(ProvisionStep));
            steps.push(Box::new(ShutdownCoordinator));
        } else {
            steps.push(Box::new(SimpleShutdownStep));
        }
        Self::new(steps)
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, ctx: &BuildContext) -> Result<BuildOutcome, BuildFailure> {
        let mut state = BuildState::new();

        for (index, step) in self.steps.iter().enumerate() {
            let result = if ctx.cancel.is_cancelled() {
                Err(BuildError::Cancelled { step: step.name() })
            } else {
                tracing::info!("==> {}", step.name());
                step.run(ctx, &mut state).await
            };

            if let Err(error) = result {
                tracing::error!("Step {} failed: {}", step.name(), error);
                for started in self.steps[..=index].iter().rev() {
                    started.rollback(ctx, &mut state).await;
                }
                return Err(BuildFailure {
                    step: step.name(),
                    error,
                    warnings: state.warnings,
                });
            }
        }

        let artifact = Artifact::assemble(&ctx.spec, &state).map_err(|error| BuildFailure {
            step: "artifact",
            error,
            warnings: state.warnings.clone(),
        })?;
        tracing::info!("Build of {} finished", artifact.name);

        Ok(BuildOutcome {
            artifact,
            shutdown: state.shutdown,
            warnings: state.warnings,
        })
    }
}

impl std::fmt::Debug for LifecycleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRunner")
            .field("steps", &self.step_names())
            .finish()
    }
}
