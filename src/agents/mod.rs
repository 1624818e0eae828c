pub mod job_parser;

pub use job_parser::parse_job_posting;
