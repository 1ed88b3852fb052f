//! Intents accepted by the studio actor.

use tokio::sync::oneshot;
use vzone_common::error::VzoneResult;
use vzone_project_model::BackgroundConfig;

/// A user intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Start,
    Pause,
    Resume,
    Stop,
    Export,
    Reset,
    SetBackground(BackgroundConfig),
    Shutdown,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Export => "export",
            Self::Reset => "reset",
            Self::SetBackground(_) => "set background",
            Self::Shutdown => "shut down",
        }
    }
}

/// An intent plus the channel its outcome is reported on.
#[derive(Debug)]
pub struct StudioCommand {
    pub intent: Intent,
    pub reply: oneshot::Sender<VzoneResult<()>>,
}

impl StudioCommand {
    pub fn new(intent: Intent) -> (Self, oneshot::Receiver<VzoneResult<()>>) {
        let (reply, rx) = oneshot::channel();
        (Self { intent, reply }, rx)
    }
}
