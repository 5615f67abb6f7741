//! Pipeline stages for the study tasks.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the network-facing stages can be driven by a mock provider.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ prompts ──▶ resolve ──▶ invoke ──▶ coerce
//! (file→text) (truncate)  (model id)  (retry)    (text / JSON)
//! ```
//!
//! 1. [`extract`]: read a PDF, DOCX, TXT or MD upload as plain text;
//!    pdfium and zip work runs in `spawn_blocking`
//! 2. [`crate::prompts`]: bound the context and build the task prompt
//! 3. [`resolve`]: pick a callable model once per process and cache it
//! 4. [`invoke`]: the only stage with network I/O; backs off on rate limits
//! 5. [`coerce`]: strip code fences and decode the promised JSON shape
//!
//! [`export`] sits outside the request path: it turns rendered questions
//! into a downloadable PDF.

pub mod coerce;
pub mod export;
pub mod extract;
pub mod invoke;
pub mod resolve;
