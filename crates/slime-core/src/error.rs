/// Errors surfaced by the engine. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// No adapter, or the adapter refused to hand out a device. Fatal.
    #[error("no compatible GPU device: {0}")]
    UnsupportedAccelerator(String),

    /// Host read-back of a GPU buffer failed; the step did not complete.
    #[error("buffer mapping failed: {0}")]
    BufferMapFailure(#[from] wgpu::BufferAsyncError),

    /// Settings the driver cannot be built from (zero agents, empty field,
    /// or sizes beyond what the device can allocate).
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("driver is not initialized")]
    NotInitialized,

    #[error("a step is already in flight")]
    StepInProgress,
}

impl From<wgpu::RequestDeviceError> for SimError {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        SimError::UnsupportedAccelerator(err.to_string())
    }
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
