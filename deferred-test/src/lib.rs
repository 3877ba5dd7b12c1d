mod backend;
mod helpers;
mod runner;
mod scene;

pub use backend::{Command, RecordingBackend};
pub use helpers::decode_all;
pub use runner::{default_camera, FrameRecord, TestRunner, TestRunnerBuilder};
pub use scene::{ObjectEvent, TestObject, TestScene};
