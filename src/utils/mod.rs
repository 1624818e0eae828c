pub mod text;

pub use text::{strip_json_fences, truncate_text};
