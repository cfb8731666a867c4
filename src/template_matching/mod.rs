/// Template matching module for screen state classification
///
/// This module provides:
/// - Named reference images loaded from a template directory
/// - Zero-mean normalized cross-correlation with deterministic tie-break
/// - Proportional shrinking of templates larger than the frame
pub mod matcher;
pub mod template;
pub mod types;

pub use matcher::{DEFAULT_THRESHOLD, TemplateMatcher, find_template};
pub use template::{TemplateError, TemplateStore};
pub use types::{Frame, MatchResult};
