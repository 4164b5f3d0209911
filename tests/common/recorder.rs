/// Callback recorders
use std::sync::{Arc, Mutex};
use upload_resilience::upload::{UploadCallbacks, UploadResponse};

/// Everything the controller reported through its callbacks
#[derive(Default)]
pub struct Recorded {
    pub progress: Vec<u8>,
    pub successes: Vec<UploadResponse>,
    pub errors: Vec<String>,
}

#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Recorded>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> UploadCallbacks {
        let progress = Arc::clone(&self.inner);
        let success = Arc::clone(&self.inner);
        let error = Arc::clone(&self.inner);

        UploadCallbacks::new()
            .on_progress(move |p| progress.lock().unwrap().progress.push(p))
            .on_success(move |r| success.lock().unwrap().successes.push(r.clone()))
            .on_error(move |m| error.lock().unwrap().errors.push(m.to_string()))
    }

    pub fn progress(&self) -> Vec<u8> {
        self.inner.lock().unwrap().progress.clone()
    }

    pub fn successes(&self) -> usize {
        self.inner.lock().unwrap().successes.len()
    }

    pub fn errors(&self) -> Vec<String> {
        self.inner.lock().unwrap().errors.clone()
    }
}
