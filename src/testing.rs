//! Test doubles for the external OCR and classification capabilities

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::capture::frame::CapturedFrame;
use crate::classify::{ClassificationService, ClassifyError};
use crate::vision::ocr::OcrResult;
use crate::vision::TextRecognizer;

pub fn blank_frame() -> CapturedFrame {
    CapturedFrame::new(vec![255u8; 4 * 4 * 4], 4, 4)
}

/// Recognizer returning a fixed list of results
pub struct FakeRecognizer {
    results: Vec<OcrResult>,
}

impl FakeRecognizer {
    pub fn new(results: &[(&str, f32)]) -> Self {
        Self {
            results: results
                .iter()
                .map(|(text, confidence)| OcrResult::new(*text, *confidence))
                .collect(),
        }
    }
}

impl TextRecognizer for FakeRecognizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn recognize(&self, _frame: &CapturedFrame) -> anyhow::Result<Vec<OcrResult>> {
        Ok(self.results.clone())
    }
}

/// Recognizer that always errors
pub struct FailingRecognizer;

impl TextRecognizer for FailingRecognizer {
    fn name(&self) -> &str {
        "failing"
    }

    fn recognize(&self, _frame: &CapturedFrame) -> anyhow::Result<Vec<OcrResult>> {
        anyhow::bail!("engine crashed")
    }
}

/// Classification service with a canned reply and a shared call log
pub struct FakeService {
    reply: Result<String, String>,
    calls: Rc<Cell<usize>>,
    names: Rc<RefCell<Vec<String>>>,
}

impl FakeService {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: Rc::default(),
            names: Rc::default(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            calls: Rc::default(),
            names: Rc::default(),
        }
    }

    /// Handle counting calls, usable after the service is boxed
    pub fn calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }

    /// Handle to the names the service was asked about
    pub fn names(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.names)
    }
}

impl ClassificationService for FakeService {
    fn remote_classify(&self, name: &str) -> Result<String, ClassifyError> {
        self.calls.set(self.calls.get() + 1);
        self.names.borrow_mut().push(name.to_string());
        self.reply.clone().map_err(ClassifyError::Other)
    }
}
