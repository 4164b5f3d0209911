/// Resilient file upload
///
/// [`UploadController`] validates a file, sends it through a [`Transfer`],
/// retries transient failures with exponential backoff and exposes the
/// session state for rendering:
///
/// ```text
/// Idle → Validating → Uploading ⇄ Retrying → Succeeded | Failed
///            ↓                 ↘
///          Idle (invalid)     Cancelled
/// ```
pub mod controller;
pub mod file;
pub mod session;
pub mod spool;
pub mod transfer;
pub mod validation;

pub use controller::{
    UploadCallbacks, UploadController, UploadControllerBuilder, UploadHandle, CANCELLED_MESSAGE,
    NO_FILE_TO_RETRY_MESSAGE,
};
pub use file::{mime_type_for, UploadFile};
pub use session::{RetryMode, UploadSession, UploadStatus};
pub use spool::SpoolTransfer;
pub use transfer::{FnTransfer, ProgressSink, Transfer, TransferResponse, UploadResponse};
pub use validation::{validate_file, ValidationError};
