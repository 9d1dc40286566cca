use std::path::PathBuf;

use async_trait::async_trait;

use crate::timeline::ActionSpec;

/// The recorded visual surface the capture driver acts on.
///
/// Action semantics belong to the implementation; the driver only sequences calls and measures
/// time around them. `perform` resolves once the surface has settled after the action.
#[async_trait]
pub trait VisualSurface: Send {
    /// Begin recording. The moment this resolves is the video's time origin.
    async fn start_recording(&mut self) -> anyhow::Result<()>;

    /// Execute one action and wait for the surface to settle.
    async fn perform(&mut self, action: &ActionSpec) -> anyhow::Result<()>;

    /// Stop recording and hand back the finalized video artifact.
    async fn finish_recording(&mut self) -> anyhow::Result<PathBuf>;

    /// Drop a recording after a failed capture. Nothing of it is kept.
    async fn discard_recording(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
