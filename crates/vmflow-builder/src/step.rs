//! Step abstraction

use crate::context::BuildContext;
use crate::error::Result;
use crate::state::BuildState;
use async_trait::async_trait;

/// One stage of the build pipeline
///
/// Steps run strictly in order. When a later step fails, `rollback` is
/// called on every step that already started, newest first.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &BuildContext, state: &mut BuildState) -> Result<()>;

    /// Undo resources this step created; most steps have nothing to undo
    async fn rollback(&self, _ctx: &BuildContext, _state: &mut BuildState) {}
}
