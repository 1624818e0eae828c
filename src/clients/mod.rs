pub mod rotating;

pub use rotating::RotatingLlmClient;
