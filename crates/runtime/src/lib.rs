// runtime crate

pub mod client;
pub mod container;
pub mod images;
pub mod process;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ClientError, RuntimeClient, RuntimeKind};
pub use container::{
    ContainerConfig, ContainerError, ContainerHandle, ContainerManager, ContainerState,
};
pub use images::map_runs_on;
pub use process::{
    BufferSink, ConsoleSink, OutputSink, OutputStream, ProcessOutput, ProcessRunner,
    SystemProcessRunner,
};
