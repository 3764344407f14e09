// CV wizard backend: per-field and whole-form validation, picture upload,
// and hand-off of the validated form to the external PDF renderer.

pub mod handlers;
pub mod validation;
