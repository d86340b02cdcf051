//! Fixtures shared by the unit tests.

use std::cell::RefCell;

use crate::error::FixError;
use crate::exiftool::{ToolInvocation, ToolInvoker, ToolOutput};

/// SOI, a bare SOS header, two bytes of scan data, EOI.
pub const TINY_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, 0x12, 0x34, 0xFF, 0xD9,
];

type Script = Box<dyn Fn(usize) -> Result<ToolOutput, FixError>>;

/// Records every invocation and answers with `script(call_index)`.
pub struct RecordingInvoker {
    pub calls: RefCell<Vec<ToolInvocation>>,
    script: Script,
}

impl RecordingInvoker {
    pub fn new(script: impl Fn(usize) -> Result<ToolOutput, FixError> + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            script: Box::new(script),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|_| exit(0))
    }
}

impl ToolInvoker for RecordingInvoker {
    fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutput, FixError> {
        let n = self.calls.borrow().len();
        self.calls.borrow_mut().push(invocation.clone());
        (self.script)(n)
    }
}

pub fn exit(code: i32) -> Result<ToolOutput, FixError> {
    Ok(ToolOutput {
        code: Some(code),
        ..Default::default()
    })
}

pub fn quiet() -> impl Fn(&str, u64, u64, &str) + Send + Sync {
    |_: &str, _: u64, _: u64, _: &str| {}
}
